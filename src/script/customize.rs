//! Directive sequence for the customization stage.
//!
//! The order here is the order things happen inside the image. It matters:
//! the keyring must exist before the sync, packages must be installed before
//! their services can be enabled, the user must exist before autologin is
//! configured, and cleanup runs last.

use crate::manifest::Manifest;
use crate::pacman::keys::staged_key_chroot_path;
use crate::pacman::mirror::{MIRRORLIST, MIRRORLIST_ORIG};
use crate::settings::{PasswordPolicy, Settings};

use super::{CustomizationScript, Directive, ServiceScope};

const SUDOERS: &str = "/etc/sudoers";
const SUDOERS_DIR: &str = "/etc/sudoers.d";
const HOSTNAME: &str = "/etc/hostname";

/// Build the customization script for `manifest`.
pub fn customization_script(manifest: &Manifest, settings: &Settings) -> CustomizationScript {
    let mut script = CustomizationScript::new();
    let image = &settings.image;
    let session = &settings.session;
    let user = manifest.username.as_str();

    script.append(Directive::SetOption('e'));
    script.append(Directive::SetOption('x'));

    script.append(Directive::LocaleGen);

    script.append(Directive::KeyringInit);
    script.append(Directive::KeyringPopulate);
    if let Some(key) = &manifest.repo_key {
        script.append(Directive::KeyAdd(staged_key_chroot_path()));
        script.append(Directive::KeyLocalSign(key.clone()));
    }
    script.append(Directive::SyncDatabases);

    script.append(Directive::InstallPackages(manifest.packages.install.clone()));
    script.append(Directive::RemovePackages(manifest.packages.remove.clone()));

    for (user_scope, scope) in [(false, ServiceScope::System), (true, ServiceScope::User)] {
        let (enable, disable) = manifest.service_toggles(user_scope);
        for unit in enable {
            script.append(Directive::EnableService {
                unit: unit.clone(),
                scope,
            });
        }
        for unit in disable {
            script.append(Directive::DisableService {
                unit: unit.clone(),
                scope,
            });
        }
    }

    script.append(Directive::LockPassword("root".into()));

    script.append(Directive::CreateGroup {
        name: image.autologin_group.clone(),
        system: true,
    });
    script.append(Directive::CreateUser {
        name: user.to_string(),
        groups: vec![image.autologin_group.clone(), image.admin_group.clone()],
    });
    match image.password_policy {
        PasswordPolicy::SameAsUsername => script.append(Directive::SetPassword {
            user: user.to_string(),
            password: user.to_string(),
        }),
        PasswordPolicy::Locked => script.append(Directive::LockPassword(user.to_string())),
    }

    script.append(Directive::WriteFile {
        path: HOSTNAME.into(),
        content: manifest.hostname.clone(),
    });

    script.append(Directive::Uncomment {
        file: SUDOERS.into(),
        pattern: format!("%{} ALL=(ALL:ALL) ALL", image.admin_group),
    });
    if let Some(rule) = &image.sudo_rule {
        script.append(Directive::WriteFile {
            path: format!("{SUDOERS_DIR}/{}", rule.name),
            content: format!("{user} ALL=(ALL) NOPASSWD: {}", rule.command),
        });
    }

    for url in &image.udev_rules {
        script.append(Directive::Download {
            url: url.clone(),
            dir: image.udev_rules_dir.clone(),
        });
    }

    for patch in &image.desktop_patches {
        script.append(Directive::Substitute {
            file: patch.file.clone(),
            from: patch.from.clone(),
            to: patch.to.clone(),
        });
    }

    script.append(Directive::SetLoginManager {
        tool: session.tool.clone(),
        manager: session.login_manager.clone(),
    });
    for entry in &session.sessions {
        script.append(Directive::RegisterSession {
            tool: session.tool.clone(),
            name: entry.name.clone(),
            session: entry.session.clone(),
            logout: entry.logout.clone(),
        });
    }
    script.append(Directive::SetDefaultSession {
        tool: session.tool.clone(),
        name: session.default_session.clone(),
    });
    if session.autologin {
        script.append(Directive::EnableAutologin {
            tool: session.tool.clone(),
            user: user.to_string(),
        });
    }

    if manifest.packages.uses_local_repo() {
        script.append(Directive::RemoveTree(format!("/{}", image.local_repo_dir)));
    }
    script.append(Directive::ClearDir("/var/cache/pacman/pkg".into()));
    script.append(Directive::RemoveTree("/var/log/pacman.log".into()));
    script.append(Directive::ClearDir("/var/lib/pacman/sync".into()));

    if settings.mirror.restore_original_mirrorlist {
        script.append(Directive::RemoveFile(format!("/{MIRRORLIST}")));
        script.append(Directive::Move {
            from: format!("/{MIRRORLIST_ORIG}"),
            to: format!("/{MIRRORLIST}"),
        });
    }

    script
}
