//! Locally built packages, handed over from a separate package build.

use anyhow::{bail, Context, Result};
use std::fs;

use crate::artifact::filesystem::move_dir;
use crate::build::context::BuildContext;

/// The package output directory must exist before anything is touched.
pub fn ensure_available(ctx: &BuildContext) -> Result<()> {
    if !ctx.local_repo_output.is_dir() {
        bail!(
            "manifest requests local packages but '{}' does not exist; build the local repository first",
            ctx.local_repo_output.display()
        );
    }
    Ok(())
}

/// Move the package output into the target root and drop the build cache.
pub fn stage(ctx: &BuildContext, dir_name: &str) -> Result<()> {
    let dest = ctx.target(dir_name);
    move_dir(&ctx.local_repo_output, &dest).with_context(|| {
        format!(
            "moving local repository '{}' into '{}'",
            ctx.local_repo_output.display(),
            dest.display()
        )
    })?;
    println!("  Local repository staged at /{}", dir_name);

    if ctx.local_repo_build.exists() {
        fs::remove_dir_all(&ctx.local_repo_build).with_context(|| {
            format!(
                "removing local build cache '{}'",
                ctx.local_repo_build.display()
            )
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::context::BuildMode;
    use crate::settings::PathSettings;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> BuildContext {
        BuildContext::new(temp.path(), &PathSettings::default(), &BuildMode::Archive).unwrap()
    }

    #[test]
    fn test_missing_output_is_reported() {
        let temp = TempDir::new().unwrap();
        let err = ensure_available(&context(&temp)).unwrap_err();
        assert!(err.to_string().contains("repo/workspace/output"));
    }

    #[test]
    fn test_stage_moves_packages_and_drops_cache() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        fs::create_dir_all(&ctx.local_repo_output).unwrap();
        fs::write(ctx.local_repo_output.join("local.db.tar.gz"), "db").unwrap();
        fs::create_dir_all(ctx.local_repo_build.join("pkg")).unwrap();
        fs::create_dir_all(&ctx.mount_point).unwrap();

        ensure_available(&ctx).unwrap();
        stage(&ctx, "molyuu_repo").unwrap();

        assert!(!ctx.local_repo_output.exists());
        assert!(!ctx.local_repo_build.exists());
        assert!(ctx.mount_point.join("molyuu_repo/local.db.tar.gz").is_file());
    }
}
