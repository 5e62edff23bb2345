//! `pacman.conf` composition.
//!
//! A configuration is the base file (`pacman.conf.base`) followed by one
//! fragment per repository (`<repo>.conf`), each wrapped in blank-line
//! separators, in the order the caller lists them.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Base configuration file name inside the pacman directory.
pub const BASE_CONFIG: &str = "pacman.conf.base";

/// Repository used alone for bootstrap, before any custom repository is reachable.
pub const UPSTREAM_REPO: &str = "upstream";

/// Concatenate a base configuration with repository fragments.
pub fn compose_config<S: AsRef<str>>(base: &str, fragments: &[S]) -> String {
    let mut config = base.to_string();
    for fragment in fragments {
        config.push('\n');
        config.push_str(fragment.as_ref());
        config.push('\n');
    }
    config
}

/// Resolves repository names to fragments under a pacman config directory.
#[derive(Debug, Clone)]
pub struct ConfigComposer {
    dir: PathBuf,
    base: String,
}

impl ConfigComposer {
    /// Read the base configuration from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let base_path = dir.join(BASE_CONFIG);
        let base = fs::read_to_string(&base_path).with_context(|| {
            format!("reading base pacman config '{}'", base_path.display())
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            base,
        })
    }

    /// Path of the fragment for `repo`.
    pub fn fragment_path(&self, repo: &str) -> PathBuf {
        self.dir.join(format!("{repo}.conf"))
    }

    /// Fail if any repository has no fragment.
    pub fn ensure_resolvable<S: AsRef<str>>(&self, repos: &[S]) -> Result<()> {
        let missing: Vec<String> = repos
            .iter()
            .map(|repo| self.fragment_path(repo.as_ref()))
            .filter(|path| !path.is_file())
            .map(|path| format!("  {}", path.display()))
            .collect();

        if !missing.is_empty() {
            bail!(
                "repository configuration fragments not found:\n{}",
                missing.join("\n")
            );
        }
        Ok(())
    }

    /// Compose the configuration for `repos`, in order.
    pub fn compose<S: AsRef<str>>(&self, repos: &[S]) -> Result<String> {
        let fragments = repos
            .iter()
            .map(|repo| {
                let path = self.fragment_path(repo.as_ref());
                fs::read_to_string(&path).with_context(|| {
                    format!(
                        "reading configuration for repository '{}' from '{}'",
                        repo.as_ref(),
                        path.display()
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(compose_config(&self.base, &fragments))
    }

    /// Configuration containing only the upstream repository.
    pub fn compose_upstream(&self) -> Result<String> {
        self.compose(&[UPSTREAM_REPO])
    }
}
