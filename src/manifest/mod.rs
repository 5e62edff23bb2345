//! Build manifest: the single declarative input describing one image.
//!
//! Loaded once at pipeline start and never mutated afterwards. JSON is the
//! native format; a `.toml` manifest is accepted as well.

mod validate;

pub use validate::validate;

use anyhow::{Context, Result};
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub username: String,
    pub hostname: String,
    pub locale: Locale,
    pub packages: Packages,
    #[serde(default)]
    pub services: Option<Services>,
    #[serde(default)]
    pub appendconfig: Option<Vec<ConfigOverlay>>,
    #[serde(default)]
    pub replaceconfig: Option<Vec<ConfigOverlay>>,
    #[serde(default)]
    pub repo_key: Option<String>,
    pub use_repos: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Locale {
    /// Lines of `/etc/locale.gen` to enable, e.g. `en_US.UTF-8 UTF-8`.
    pub generate: Vec<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Packages {
    #[serde(default)]
    pub install: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
    /// Presence marker: any value means the externally built local repository
    /// must be staged into the image.
    #[serde(default)]
    pub local: Option<IgnoredAny>,
}

impl Packages {
    pub fn uses_local_repo(&self) -> bool {
        self.local.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Services {
    #[serde(default)]
    pub system: Option<ServiceToggles>,
    #[serde(default)]
    pub user: Option<ServiceToggles>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceToggles {
    #[serde(default)]
    pub enable: Option<Vec<String>>,
    #[serde(default)]
    pub disable: Option<Vec<String>>,
}

/// A file to append to / replace inside the target root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverlay {
    /// Absolute path inside the target root.
    pub path: String,
    /// Host path of the content, relative to the project root unless absolute.
    pub content: String,
}

impl Manifest {
    /// Read and parse a manifest file. Does not validate; see [`validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading manifest '{}'", path.display()))?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            toml::from_str(&raw).with_context(|| format!("parsing manifest '{}'", path.display()))
        } else {
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing manifest '{}'", path.display()))
        }
    }

    /// Service names for one scope, enable list first.
    pub fn service_toggles(&self, user_scope: bool) -> (&[String], &[String]) {
        let toggles = self.services.as_ref().and_then(|services| {
            if user_scope {
                services.user.as_ref()
            } else {
                services.system.as_ref()
            }
        });
        match toggles {
            Some(t) => (
                t.enable.as_deref().unwrap_or_default(),
                t.disable.as_deref().unwrap_or_default(),
            ),
            None => Default::default(),
        }
    }

    pub fn append_overlays(&self) -> &[ConfigOverlay] {
        self.appendconfig.as_deref().unwrap_or_default()
    }

    pub fn replace_overlays(&self) -> &[ConfigOverlay] {
        self.replaceconfig.as_deref().unwrap_or_default()
    }
}
