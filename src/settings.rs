//! Builder settings (`builder.toml`).
//!
//! Everything that is a product decision rather than manifest data lives
//! here: the project layout, how the mirror list is obtained, the default
//! password policy, the udev rule sources, the session table. The file is
//! optional; every field has a default matching the stock image.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Settings file name, looked up in the project root.
pub const SETTINGS_FILE: &str = "builder.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub paths: PathSettings,
    pub mirror: MirrorSettings,
    pub image: ImageSettings,
    pub session: SessionSettings,
}

/// Project layout, relative to the project root.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    pub manifest: String,
    pub pacman_dir: String,
    pub workspace: String,
    pub output_dir: String,
    pub archive_name: String,
    pub local_repo_output: String,
    pub local_repo_build: String,
    pub pgp_key: String,
    pub lock_file: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            manifest: "manifest.json".into(),
            pacman_dir: "pacman".into(),
            workspace: "workspace".into(),
            output_dir: "output".into(),
            archive_name: "rootfs.tar.gz".into(),
            local_repo_output: "repo/workspace/output".into(),
            local_repo_build: "repo/workspace/build".into(),
            pgp_key: "pgp_key.asc".into(),
            lock_file: ".rootfs-builder.lock".into(),
        }
    }
}

/// Where the pre-bootstrap mirror list comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorSource {
    /// Reuse the build host's mirror list.
    Host,
    /// Download a current list from `mirror.url`.
    Network,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorSettings {
    pub source: MirrorSource,
    pub host_path: String,
    pub url: String,
    /// Put the bootstrap's own mirror list back once customization is done.
    ///
    /// Independent of `source`: a network-resolved list may be worth keeping
    /// in the image.
    pub restore_original_mirrorlist: bool,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            source: MirrorSource::Host,
            host_path: "/etc/pacman.d/mirrorlist".into(),
            url: "https://archlinux.org/mirrorlist/?country=all&protocol=https&use_mirror_status=on"
                .into(),
            restore_original_mirrorlist: true,
        }
    }
}

/// Initial password for the autologin user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PasswordPolicy {
    /// Password equals the username. Weak on purpose: the stock image is a
    /// single-user kiosk that logs in automatically.
    SameAsUsername,
    /// No usable password; the account is locked for password login.
    Locked,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SudoRule {
    /// File name under /etc/sudoers.d.
    pub name: String,
    /// Command (with arguments) the user may run without a password.
    pub command: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilePatch {
    pub file: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageSettings {
    /// Directory name of the staged local repository inside the target root.
    pub local_repo_dir: String,
    pub autologin_group: String,
    pub admin_group: String,
    pub password_policy: PasswordPolicy,
    pub sudo_rule: Option<SudoRule>,
    pub udev_rules_dir: String,
    pub udev_rules: Vec<String>,
    pub desktop_patches: Vec<FilePatch>,
}

impl Default for ImageSettings {
    fn default() -> Self {
        const OVERSTEER: &str = "https://raw.githubusercontent.com/berarma/oversteer/master/data/udev";
        Self {
            local_repo_dir: "molyuu_repo".into(),
            autologin_group: "autologin".into(),
            admin_group: "wheel".into(),
            password_policy: PasswordPolicy::SameAsUsername,
            sudo_rule: Some(SudoRule {
                name: "steam".into(),
                command: "/usr/bin/dmidecode -t 11".into(),
            }),
            udev_rules_dir: "/usr/lib/udev/rules.d".into(),
            udev_rules: vec![
                format!("{OVERSTEER}/99-fanatec-wheel-perms.rules"),
                format!("{OVERSTEER}/99-logitech-wheel-perms.rules"),
                format!("{OVERSTEER}/99-thrustmaster-wheel-perms.rules"),
            ],
            desktop_patches: vec![FilePatch {
                file: "/usr/share/applications/steam.desktop".into(),
                from: "Exec=/usr/bin/steam-runtime".into(),
                to: "Exec=/usr/bin/steam-runtime -steamdeck".into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionEntry {
    pub name: String,
    pub session: String,
    pub logout: Option<String>,
}

/// Login manager and session registration, applied with `session.tool`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    pub tool: String,
    pub login_manager: String,
    pub sessions: Vec<SessionEntry>,
    pub default_session: String,
    pub autologin: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let plasma_logout = "qdbus6 org.kde.Shutdown /Shutdown org.kde.Shutdown.logout";
        Self {
            tool: "molyuuctl".into(),
            login_manager: "lightdm".into(),
            sessions: vec![
                SessionEntry {
                    name: "desktop".into(),
                    session: "plasmax11".into(),
                    logout: Some(plasma_logout.into()),
                },
                SessionEntry {
                    name: "plasma".into(),
                    session: "plasmax11".into(),
                    logout: Some(plasma_logout.into()),
                },
                SessionEntry {
                    name: "steam".into(),
                    session: "gamescope-wayland".into(),
                    logout: None,
                },
            ],
            default_session: "steam".into(),
            autologin: true,
        }
    }
}

impl Settings {
    /// Load `builder.toml` from the project root, or defaults if it is absent.
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(SETTINGS_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading settings '{}'", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing settings '{}'", path.display()))
    }
}
