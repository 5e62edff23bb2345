//! The build pipeline: fifteen stages, run strictly in order by one driver.
//!
//! Every stage returns a `Result`; the first failure aborts the build. Once
//! the workspace has been reset, teardown runs on every exit path, so a bound
//! mount point is always unmounted before the workspace is deleted.

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::artifact::rootfs::package_rootfs;
use crate::build::context::BuildContext;
use crate::build::overlay::{self, OverlayMode};
use crate::build::{local_repo, locale, workspace};
use crate::manifest::{self, Manifest};
use crate::pacman::config::{ConfigComposer, UPSTREAM_REPO};
use crate::pacman::{keys, mirror};
use crate::process::{Cmd, Host};
use crate::script::{customization_script, CustomizationScript};
use crate::settings::Settings;
use crate::timing::Timer;

/// Customization script location inside the target root.
pub const SCRIPT_NAME: &str = "init.sh";

const PACMAN_CONF: &str = "/etc/pacman.conf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ValidateInputs,
    WorkspaceReset,
    Mount,
    ResolveMirror,
    Bootstrap,
    InstallFullConfig,
    StageLocalRepo,
    ConfigureLocale,
    StagePgpKey,
    GenerateCustomizationScript,
    RunCustomizationScript,
    ApplyAppendConfig,
    ApplyReplaceConfig,
    Package,
    Teardown,
}

impl Stage {
    /// All stages, in execution order.
    pub const ALL: [Stage; 15] = [
        Stage::ValidateInputs,
        Stage::WorkspaceReset,
        Stage::Mount,
        Stage::ResolveMirror,
        Stage::Bootstrap,
        Stage::InstallFullConfig,
        Stage::StageLocalRepo,
        Stage::ConfigureLocale,
        Stage::StagePgpKey,
        Stage::GenerateCustomizationScript,
        Stage::RunCustomizationScript,
        Stage::ApplyAppendConfig,
        Stage::ApplyReplaceConfig,
        Stage::Package,
        Stage::Teardown,
    ];

    /// Short name used in log prefixes.
    pub fn label(self) -> &'static str {
        match self {
            Stage::ValidateInputs => "validate",
            Stage::WorkspaceReset => "workspace",
            Stage::Mount => "mount",
            Stage::ResolveMirror => "mirror",
            Stage::Bootstrap => "bootstrap",
            Stage::InstallFullConfig => "pacman-conf",
            Stage::StageLocalRepo => "local-repo",
            Stage::ConfigureLocale => "locale",
            Stage::StagePgpKey => "pgp-key",
            Stage::GenerateCustomizationScript => "script",
            Stage::RunCustomizationScript => "chroot",
            Stage::ApplyAppendConfig => "append",
            Stage::ApplyReplaceConfig => "replace",
            Stage::Package => "package",
            Stage::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ValidateInputs => "ValidateInputs",
            Stage::WorkspaceReset => "WorkspaceReset",
            Stage::Mount => "Mount",
            Stage::ResolveMirror => "ResolveMirror",
            Stage::Bootstrap => "Bootstrap",
            Stage::InstallFullConfig => "InstallFullConfig",
            Stage::StageLocalRepo => "StageLocalRepo",
            Stage::ConfigureLocale => "ConfigureLocale",
            Stage::StagePgpKey => "StagePgpKey",
            Stage::GenerateCustomizationScript => "GenerateCustomizationScript",
            Stage::RunCustomizationScript => "RunCustomizationScript",
            Stage::ApplyAppendConfig => "ApplyAppendConfig",
            Stage::ApplyReplaceConfig => "ApplyReplaceConfig",
            Stage::Package => "Package",
            Stage::Teardown => "Teardown",
        };
        f.write_str(name)
    }
}

/// What a successful build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Path of the root filesystem archive.
    Archive(PathBuf),
    /// The caller's mount point, now holding a finished root.
    Installed(PathBuf),
}

pub fn pacstrap_command(config: &Path, target_root: &Path) -> Cmd {
    Cmd::new("pacstrap")
        .arg("-K")
        .arg("-C")
        .arg_path(config)
        .arg_path(target_root)
}

pub fn chroot_command(target_root: &Path) -> Cmd {
    Cmd::new("arch-chroot")
        .arg_path(target_root)
        .arg(format!("/{SCRIPT_NAME}"))
}

/// Drives one build from validation to teardown.
pub struct Orchestrator<'a> {
    host: &'a mut dyn Host,
    manifest: &'a Manifest,
    settings: &'a Settings,
    ctx: &'a BuildContext,
    composer: Option<ConfigComposer>,
    script: Option<CustomizationScript>,
    mounted: bool,
    completed: Vec<Stage>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        host: &'a mut dyn Host,
        manifest: &'a Manifest,
        settings: &'a Settings,
        ctx: &'a BuildContext,
    ) -> Self {
        Self {
            host,
            manifest,
            settings,
            ctx,
            composer: None,
            script: None,
            mounted: false,
            completed: Vec::new(),
        }
    }

    /// Stages that ran to completion, in order. Skipped stages are absent.
    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    /// Run the whole build.
    pub fn run(&mut self) -> Result<BuildOutcome> {
        self.step(Stage::ValidateInputs, Self::validate_inputs)?;
        self.step(Stage::WorkspaceReset, Self::reset_workspace)?;

        let result = self.build();
        let teardown = self.step(Stage::Teardown, Self::teardown);

        match (result, teardown) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Err(err), Ok(())) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Err(teardown_err)) => {
                eprintln!("[rootfs:teardown] also failed: {:#}", teardown_err);
                Err(err)
            }
        }
    }

    fn build(&mut self) -> Result<BuildOutcome> {
        if self.ctx.automount {
            self.step(Stage::Mount, Self::mount)?;
        } else {
            skip(Stage::Mount, "target mounted by caller");
        }

        self.step(Stage::ResolveMirror, Self::resolve_mirror)?;
        self.step(Stage::Bootstrap, Self::bootstrap)?;
        self.step(Stage::InstallFullConfig, Self::install_full_config)?;

        if self.manifest.packages.uses_local_repo() {
            self.step(Stage::StageLocalRepo, Self::stage_local_repo)?;
        } else {
            skip(Stage::StageLocalRepo, "no local packages");
        }

        self.step(Stage::ConfigureLocale, Self::configure_locale)?;

        if self.manifest.repo_key.is_some() {
            self.step(Stage::StagePgpKey, Self::stage_pgp_key)?;
        } else {
            skip(Stage::StagePgpKey, "no repo_key");
        }

        self.step(Stage::GenerateCustomizationScript, Self::generate_script)?;
        self.step(Stage::RunCustomizationScript, Self::run_script)?;
        self.step(Stage::ApplyAppendConfig, |this| {
            overlay::apply(this.ctx, this.manifest.append_overlays(), OverlayMode::Append)
        })?;
        self.step(Stage::ApplyReplaceConfig, |this| {
            overlay::apply(this.ctx, this.manifest.replace_overlays(), OverlayMode::Replace)
        })?;

        if self.ctx.package_rootfs {
            let archive = self.step(Stage::Package, Self::package)?;
            Ok(BuildOutcome::Archive(archive))
        } else {
            skip(Stage::Package, "install mode");
            Ok(BuildOutcome::Installed(self.ctx.mount_point.clone()))
        }
    }

    fn step<T>(&mut self, stage: Stage, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        println!("[rootfs:{}] {}", stage.label(), stage);
        let timer = Timer::start(&stage.to_string());
        let value = f(self).with_context(|| format!("stage {} failed", stage))?;
        timer.finish();
        self.completed.push(stage);
        Ok(value)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stages
    // ─────────────────────────────────────────────────────────────────────

    fn validate_inputs(&mut self) -> Result<()> {
        manifest::validate(self.manifest)?;

        let composer = ConfigComposer::load(&self.ctx.pacman_dir)?;
        composer.ensure_resolvable(&[UPSTREAM_REPO])?;
        composer.ensure_resolvable(&self.manifest.use_repos)?;
        println!(
            "  Repositories: {}",
            if self.manifest.use_repos.is_empty() {
                "(none)".to_string()
            } else {
                self.manifest.use_repos.join(", ")
            }
        );
        self.composer = Some(composer);

        if self.manifest.packages.uses_local_repo() {
            local_repo::ensure_available(self.ctx)?;
        }
        if self.manifest.repo_key.is_some() {
            keys::verify_key_file(&self.ctx.pgp_key)?;
        }
        Ok(())
    }

    fn reset_workspace(&mut self) -> Result<()> {
        workspace::reset(self.ctx)
    }

    fn mount(&mut self) -> Result<()> {
        workspace::mount(self.host, self.ctx)?;
        self.mounted = true;
        Ok(())
    }

    fn resolve_mirror(&mut self) -> Result<()> {
        mirror::resolve(
            self.host,
            &self.settings.mirror,
            &self.ctx.resolved_mirrorlist(),
        )
    }

    fn bootstrap(&mut self) -> Result<()> {
        let config = self.composer()?.compose_upstream()?;
        let config_path = self.ctx.upstream_config();
        fs::write(&config_path, config)
            .with_context(|| format!("writing '{}'", config_path.display()))?;

        self.host
            .run(&pacstrap_command(&config_path, &self.ctx.mount_point))
    }

    fn install_full_config(&mut self) -> Result<()> {
        let config = self.composer()?.compose(&self.manifest.use_repos)?;
        let config_path = self.ctx.target(PACMAN_CONF);
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }
        fs::write(&config_path, config)
            .with_context(|| format!("writing '{}'", config_path.display()))?;
        println!("  Installed {}", PACMAN_CONF);

        mirror::install(
            &self.ctx.mount_point,
            &self.ctx.resolved_mirrorlist(),
            self.settings.mirror.restore_original_mirrorlist,
        )
    }

    fn stage_local_repo(&mut self) -> Result<()> {
        local_repo::stage(self.ctx, &self.settings.image.local_repo_dir)
    }

    fn configure_locale(&mut self) -> Result<()> {
        locale::configure(&self.ctx.mount_point, &self.manifest.locale)
    }

    fn stage_pgp_key(&mut self) -> Result<()> {
        keys::stage_key(&self.ctx.pgp_key, &self.ctx.mount_point)
    }

    fn generate_script(&mut self) -> Result<()> {
        let script = customization_script(self.manifest, self.settings);
        println!("  {} directives", script.len());
        self.script = Some(script);
        Ok(())
    }

    fn run_script(&mut self) -> Result<()> {
        let script = self
            .script
            .as_ref()
            .context("customization script was not generated")?;
        let script_path = self.ctx.mount_point.join(SCRIPT_NAME);

        fs::write(&script_path, script.render())
            .with_context(|| format!("writing '{}'", script_path.display()))?;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("making '{}' executable", script_path.display()))?;

        let run = self.host.run(&chroot_command(&self.ctx.mount_point));
        let cleanup = remove_script_and_key(&script_path, &self.ctx.mount_point);

        run?;
        cleanup
    }

    fn package(&mut self) -> Result<PathBuf> {
        package_rootfs(self.host, &self.ctx.mount_point, &self.ctx.archive_path())
    }

    fn teardown(&mut self) -> Result<()> {
        let mounted = self.mounted;
        workspace::teardown(self.host, self.ctx, mounted)?;
        self.mounted = false;
        Ok(())
    }

    fn composer(&self) -> Result<&ConfigComposer> {
        self.composer
            .as_ref()
            .context("pacman configuration was not validated")
    }
}

fn skip(stage: Stage, reason: &str) {
    println!("[rootfs:{}] {} skipped ({})", stage.label(), stage, reason);
}

fn remove_script_and_key(script_path: &Path, target_root: &Path) -> Result<()> {
    if script_path.exists() {
        fs::remove_file(script_path)
            .with_context(|| format!("removing '{}'", script_path.display()))?;
    }
    keys::remove_staged_key(target_root)
}

/// Build `manifest` with `settings` into the layout described by `ctx`.
pub fn run_build(
    host: &mut dyn Host,
    manifest: &Manifest,
    settings: &Settings,
    ctx: &BuildContext,
) -> Result<BuildOutcome> {
    Orchestrator::new(host, manifest, settings, ctx).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_names() {
        assert_eq!(Stage::ALL.first(), Some(&Stage::ValidateInputs));
        assert_eq!(Stage::ALL.last(), Some(&Stage::Teardown));
        let bootstrap = Stage::ALL.iter().position(|s| *s == Stage::Bootstrap);
        let full = Stage::ALL.iter().position(|s| *s == Stage::InstallFullConfig);
        assert!(bootstrap < full);
        assert_eq!(Stage::RunCustomizationScript.to_string(), "RunCustomizationScript");
        assert_eq!(Stage::RunCustomizationScript.label(), "chroot");
    }

    #[test]
    fn test_external_commands() {
        assert_eq!(
            pacstrap_command(Path::new("/ws/pacman.upstream.conf"), Path::new("/ws/mnt"))
                .to_string(),
            "pacstrap -K -C /ws/pacman.upstream.conf /ws/mnt"
        );
        assert_eq!(
            chroot_command(Path::new("/ws/mnt")).to_string(),
            "arch-chroot /ws/mnt /init.sh"
        );
    }

    #[test]
    fn test_script_and_key_removed() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join(SCRIPT_NAME);
        fs::write(&script, "#!/bin/bash\n").unwrap();
        fs::write(temp.path().join(keys::STAGED_KEY), "key").unwrap();

        remove_script_and_key(&script, temp.path()).unwrap();

        assert!(!script.exists());
        assert!(!temp.path().join(keys::STAGED_KEY).exists());
    }
}
