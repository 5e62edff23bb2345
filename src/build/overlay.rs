//! Configuration overlays: host files appended to, or written over, files in
//! the target root.

use anyhow::{bail, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use crate::build::context::BuildContext;
use crate::manifest::ConfigOverlay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode {
    Append,
    Replace,
}

impl OverlayMode {
    fn verb(self) -> &'static str {
        match self {
            OverlayMode::Append => "Appended",
            OverlayMode::Replace => "Replaced",
        }
    }
}

/// Apply `overlays` in order.
pub fn apply(ctx: &BuildContext, overlays: &[ConfigOverlay], mode: OverlayMode) -> Result<()> {
    if overlays.is_empty() {
        println!("  Nothing to apply");
        return Ok(());
    }

    for overlay in overlays {
        let source = ctx.project_path(&overlay.content);
        let content = fs::read(&source)
            .with_context(|| format!("reading overlay content '{}'", source.display()))?;
        let dest = resolve_inside(&ctx.mount_point, &overlay.path)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }

        match mode {
            OverlayMode::Append => {
                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&dest)
                    .with_context(|| format!("opening '{}' for append", dest.display()))?;
                file.write_all(&content)
                    .with_context(|| format!("appending to '{}'", dest.display()))?;
            }
            OverlayMode::Replace => {
                fs::write(&dest, &content)
                    .with_context(|| format!("writing '{}'", dest.display()))?;
            }
        }
        println!("  {} {} <- {}", mode.verb(), overlay.path, overlay.content);
    }
    Ok(())
}

/// Host path of `inner` under `root`, refusing any existing symlink on the way.
///
/// A symlink inside the built image is resolved by the host kernel, so writing
/// through one could land outside the target root.
fn resolve_inside(root: &Path, inner: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    for component in Path::new(inner).components() {
        match component {
            Component::RootDir => {}
            Component::Normal(part) => {
                path.push(part);
                if path.is_symlink() {
                    bail!(
                        "refusing to write '{}' through symlink '{}'",
                        inner,
                        path.display()
                    );
                }
            }
            _ => bail!("overlay path '{}' must be absolute and normalized", inner),
        }
    }
    if path == root {
        bail!("overlay path '{}' names the target root itself", inner);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::context::BuildMode;
    use crate::settings::PathSettings;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BuildContext) {
        let temp = TempDir::new().unwrap();
        let ctx =
            BuildContext::new(temp.path(), &PathSettings::default(), &BuildMode::Archive).unwrap();
        fs::create_dir_all(ctx.mount_point.join("etc")).unwrap();
        (temp, ctx)
    }

    fn overlay(path: &str, content: &str) -> ConfigOverlay {
        ConfigOverlay {
            path: path.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_append_keeps_existing_content() {
        let (temp, ctx) = setup();
        fs::write(ctx.mount_point.join("etc/environment"), "A=1\n").unwrap();
        fs::write(temp.path().join("env.extra"), "B=2\n").unwrap();

        apply(
            &ctx,
            &[overlay("/etc/environment", "env.extra")],
            OverlayMode::Append,
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(ctx.mount_point.join("etc/environment")).unwrap(),
            "A=1\nB=2\n"
        );
    }

    #[test]
    fn test_replace_in_manifest_order() {
        let (temp, ctx) = setup();
        fs::write(ctx.mount_point.join("etc/issue"), "stock\n").unwrap();
        fs::write(temp.path().join("first"), "first\n").unwrap();
        fs::write(temp.path().join("second"), "second\n").unwrap();

        apply(
            &ctx,
            &[overlay("/etc/issue", "first"), overlay("/etc/issue", "second")],
            OverlayMode::Replace,
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(ctx.mount_point.join("etc/issue")).unwrap(),
            "second\n"
        );
    }

    #[test]
    fn test_replace_creates_parent_dirs() {
        let (temp, ctx) = setup();
        fs::write(temp.path().join("conf"), "x\n").unwrap();

        apply(
            &ctx,
            &[overlay("/etc/sddm.conf.d/autologin.conf", "conf")],
            OverlayMode::Replace,
        )
        .unwrap();

        assert!(ctx.mount_point.join("etc/sddm.conf.d/autologin.conf").is_file());
    }

    #[test]
    fn test_missing_content_fails() {
        let (_temp, ctx) = setup();
        let err = apply(&ctx, &[overlay("/etc/x", "absent")], OverlayMode::Append).unwrap_err();
        assert!(err.to_string().contains("absent"));
    }

    #[test]
    fn test_symlink_component_is_refused() {
        let (temp, ctx) = setup();
        let outside = temp.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, ctx.mount_point.join("etc/escape")).unwrap();
        fs::write(temp.path().join("conf"), "x\n").unwrap();

        let err = apply(
            &ctx,
            &[overlay("/etc/escape/file", "conf")],
            OverlayMode::Replace,
        )
        .unwrap_err();

        assert!(err.to_string().contains("symlink"));
        assert!(!outside.join("file").exists());
    }
}
