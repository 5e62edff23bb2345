//! Mirror list resolution.
//!
//! The list is resolved into the workspace before bootstrap, so a broken
//! network fails the build before the long pacstrap run. After bootstrap it is
//! installed into the target root, optionally keeping the bootstrap's own list
//! as `mirrorlist.orig` for the customization script to put back.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use crate::process::Host;
use crate::settings::{MirrorSettings, MirrorSource};

/// Mirror list location relative to a root filesystem.
pub const MIRRORLIST: &str = "etc/pacman.d/mirrorlist";

/// Where the bootstrap's mirror list is parked while the build list is active.
pub const MIRRORLIST_ORIG: &str = "etc/pacman.d/mirrorlist.orig";

/// Uncomment `#Server = ...` lines.
///
/// The mirror status endpoint returns every server commented out.
pub fn enable_servers(list: &str) -> String {
    let mut enabled = String::with_capacity(list.len());
    for line in list.lines() {
        match line.strip_prefix('#') {
            Some(rest) if rest.trim_start().starts_with("Server") => enabled.push_str(rest.trim_start()),
            _ => enabled.push_str(line),
        }
        enabled.push('\n');
    }
    enabled
}

fn count_servers(list: &str) -> usize {
    list.lines()
        .filter(|line| line.trim_start().starts_with("Server"))
        .count()
}

/// Obtain the mirror list and write it to `dest`.
pub fn resolve(host: &mut dyn Host, settings: &MirrorSettings, dest: &Path) -> Result<()> {
    let list = match settings.source {
        MirrorSource::Host => {
            let host_path = Path::new(&settings.host_path);
            println!("  Using host mirror list {}", host_path.display());
            fs::read_to_string(host_path)
                .with_context(|| format!("reading host mirror list '{}'", host_path.display()))?
        }
        MirrorSource::Network => {
            println!("  Fetching mirror list from {}", settings.url);
            let fetched = host
                .fetch_text(&settings.url)
                .context("fetching current mirror list")?;
            enable_servers(&fetched)
        }
    };

    let servers = count_servers(&list);
    if servers == 0 {
        bail!("resolved mirror list contains no 'Server' entries");
    }

    fs::write(dest, &list)
        .with_context(|| format!("writing resolved mirror list '{}'", dest.display()))?;
    println!("  Mirror list resolved ({} servers)", servers);
    Ok(())
}

/// Install a resolved mirror list into `target_root`.
///
/// With `keep_original`, the list the bootstrap left behind is renamed to
/// [`MIRRORLIST_ORIG`] first; it must exist.
pub fn install(target_root: &Path, resolved: &Path, keep_original: bool) -> Result<()> {
    let target = target_root.join(MIRRORLIST);

    if keep_original {
        let original = target_root.join(MIRRORLIST_ORIG);
        if !target.is_file() {
            bail!(
                "bootstrap left no mirror list at '{}' to preserve",
                target.display()
            );
        }
        fs::rename(&target, &original).with_context(|| {
            format!(
                "moving '{}' -> '{}'",
                target.display(),
                original.display()
            )
        })?;
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating '{}'", parent.display()))?;
    }
    fs::copy(resolved, &target).with_context(|| {
        format!(
            "installing mirror list '{}' -> '{}'",
            resolved.display(),
            target.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Cmd;
    use tempfile::TempDir;

    struct FixedFetch(&'static str);

    impl Host for FixedFetch {
        fn run(&mut self, cmd: &Cmd) -> Result<()> {
            bail!("unexpected command {}", cmd)
        }

        fn fetch_text(&mut self, _url: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn test_enable_servers() {
        let list = "## Germany\n#Server = https://a.example/$repo/os/$arch\n# comment\n";
        assert_eq!(
            enable_servers(list),
            "## Germany\nServer = https://a.example/$repo/os/$arch\n# comment\n"
        );
    }

    #[test]
    fn test_resolve_from_network() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("mirrorlist");
        let settings = MirrorSettings {
            source: MirrorSource::Network,
            ..MirrorSettings::default()
        };
        let mut host = FixedFetch("#Server = https://a.example/$repo/os/$arch\n");

        resolve(&mut host, &settings, &dest).unwrap();
        assert_eq!(
            fs::read_to_string(&dest).unwrap(),
            "Server = https://a.example/$repo/os/$arch\n"
        );
    }

    #[test]
    fn test_resolve_from_host_file() {
        let temp = TempDir::new().unwrap();
        let host_list = temp.path().join("host-mirrorlist");
        fs::write(&host_list, "Server = https://b.example/$repo/os/$arch\n").unwrap();
        let dest = temp.path().join("mirrorlist");
        let settings = MirrorSettings {
            source: MirrorSource::Host,
            host_path: host_list.to_string_lossy().into_owned(),
            ..MirrorSettings::default()
        };

        resolve(&mut FixedFetch(""), &settings, &dest).unwrap();
        assert!(fs::read_to_string(&dest).unwrap().contains("b.example"));
    }

    #[test]
    fn test_resolve_rejects_empty_list() {
        let temp = TempDir::new().unwrap();
        let settings = MirrorSettings {
            source: MirrorSource::Network,
            ..MirrorSettings::default()
        };
        let err = resolve(
            &mut FixedFetch("<html>maintenance</html>"),
            &settings,
            &temp.path().join("mirrorlist"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no 'Server' entries"));
    }

    #[test]
    fn test_install_keeps_original() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir_all(root.join("etc/pacman.d")).unwrap();
        fs::write(root.join(MIRRORLIST), "original\n").unwrap();
        let resolved = temp.path().join("mirrorlist");
        fs::write(&resolved, "Server = x\n").unwrap();

        install(&root, &resolved, true).unwrap();
        assert_eq!(fs::read_to_string(root.join(MIRRORLIST)).unwrap(), "Server = x\n");
        assert_eq!(fs::read_to_string(root.join(MIRRORLIST_ORIG)).unwrap(), "original\n");
    }

    #[test]
    fn test_install_without_original() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let resolved = temp.path().join("mirrorlist");
        fs::write(&resolved, "Server = x\n").unwrap();

        assert!(install(&root, &resolved, true).is_err());
        install(&root, &resolved, false).unwrap();
        assert!(root.join(MIRRORLIST).is_file());
        assert!(!root.join(MIRRORLIST_ORIG).exists());
    }
}
