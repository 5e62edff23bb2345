//! Build context: every path a build touches, resolved once.
//!
//! Stages never look at the process working directory; they receive this
//! context and use its absolute paths.

use anyhow::{bail, Context, Result};
use std::path::{Component, Path, PathBuf};

use crate::settings::PathSettings;

/// How the finished root filesystem is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildMode {
    /// Bind-mount a workspace rootfs, build into it, package it as an archive.
    Archive,
    /// Build directly into a mount point the caller has already prepared.
    Install { mount_point: PathBuf },
}

#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Project root holding the manifest, pacman fragments and key file.
    pub project_root: PathBuf,
    /// Ephemeral workspace, destroyed and recreated per build.
    pub workspace: PathBuf,
    /// Where the target root lives while it is being built.
    pub mount_point: PathBuf,
    /// Backing directory bind-mounted onto `mount_point` in archive mode.
    pub rootfs_storage: PathBuf,
    pub pacman_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_name: String,
    pub local_repo_output: PathBuf,
    pub local_repo_build: PathBuf,
    pub pgp_key: PathBuf,
    pub lock_file: PathBuf,
    /// Mount and unmount the target root ourselves.
    pub automount: bool,
    /// Produce an archive at the end.
    pub package_rootfs: bool,
}

impl BuildContext {
    /// Resolve all paths for a build rooted at `project_root`.
    ///
    /// # Errors
    ///
    /// Fails if the project root cannot be resolved, or if an install-mode
    /// mount point is missing or lies inside the workspace.
    pub fn new(project_root: &Path, paths: &PathSettings, mode: &BuildMode) -> Result<Self> {
        let project_root = project_root
            .canonicalize()
            .with_context(|| format!("resolving project root '{}'", project_root.display()))?;
        let workspace = project_root.join(&paths.workspace);

        let (mount_point, automount, package_rootfs) = match mode {
            BuildMode::Archive => (workspace.join("mnt"), true, true),
            BuildMode::Install { mount_point } => {
                if !mount_point.is_dir() {
                    bail!(
                        "install target '{}' is not a directory; mount the target filesystem first",
                        mount_point.display()
                    );
                }
                let mount_point = mount_point.canonicalize().with_context(|| {
                    format!("resolving install target '{}'", mount_point.display())
                })?;
                if mount_point.starts_with(&workspace) || workspace.starts_with(&mount_point) {
                    bail!(
                        "install target '{}' overlaps the build workspace '{}'",
                        mount_point.display(),
                        workspace.display()
                    );
                }
                (mount_point, false, false)
            }
        };

        Ok(Self {
            rootfs_storage: workspace.join("rootfs"),
            pacman_dir: project_root.join(&paths.pacman_dir),
            output_dir: project_root.join(&paths.output_dir),
            archive_name: paths.archive_name.clone(),
            local_repo_output: project_root.join(&paths.local_repo_output),
            local_repo_build: project_root.join(&paths.local_repo_build),
            pgp_key: project_root.join(&paths.pgp_key),
            lock_file: project_root.join(&paths.lock_file),
            workspace,
            mount_point,
            automount,
            package_rootfs,
            project_root,
        })
    }

    /// Path of `inner` (absolute inside the image) under the target root.
    pub fn target(&self, inner: &str) -> PathBuf {
        let relative: PathBuf = Path::new(inner)
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.mount_point.join(relative)
    }

    /// Host path for a project-relative (or absolute) path.
    pub fn project_path(&self, path: &str) -> PathBuf {
        self.project_root.join(path)
    }

    /// Bootstrap-time pacman configuration.
    pub fn upstream_config(&self) -> PathBuf {
        self.workspace.join("pacman.upstream.conf")
    }

    /// Mirror list resolved before bootstrap.
    pub fn resolved_mirrorlist(&self) -> PathBuf {
        self.workspace.join("mirrorlist")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(&self.archive_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_archive_mode_layout() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(temp.path(), &PathSettings::default(), &BuildMode::Archive)
            .unwrap();
        let root = temp.path().canonicalize().unwrap();

        assert!(ctx.automount);
        assert!(ctx.package_rootfs);
        assert_eq!(ctx.workspace, root.join("workspace"));
        assert_eq!(ctx.mount_point, root.join("workspace/mnt"));
        assert_eq!(ctx.rootfs_storage, root.join("workspace/rootfs"));
        assert_eq!(ctx.archive_path(), root.join("output/rootfs.tar.gz"));
        assert_eq!(ctx.local_repo_output, root.join("repo/workspace/output"));
    }

    #[test]
    fn test_install_mode_uses_caller_mount_point() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        fs::create_dir_all(&target).unwrap();

        let mode = BuildMode::Install {
            mount_point: target.clone(),
        };
        let ctx = BuildContext::new(temp.path(), &PathSettings::default(), &mode).unwrap();

        assert!(!ctx.automount);
        assert!(!ctx.package_rootfs);
        assert_eq!(ctx.mount_point, target.canonicalize().unwrap());
    }

    #[test]
    fn test_install_mode_rejects_missing_target() {
        let temp = TempDir::new().unwrap();
        let mode = BuildMode::Install {
            mount_point: temp.path().join("absent"),
        };
        let err = BuildContext::new(temp.path(), &PathSettings::default(), &mode).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_install_mode_rejects_target_inside_workspace() {
        let temp = TempDir::new().unwrap();
        let inside = temp.path().join("workspace/mnt");
        fs::create_dir_all(&inside).unwrap();
        let mode = BuildMode::Install {
            mount_point: inside,
        };
        let err = BuildContext::new(temp.path(), &PathSettings::default(), &mode).unwrap_err();
        assert!(err.to_string().contains("overlaps"));
    }

    #[test]
    fn test_target_path_stays_under_root() {
        let temp = TempDir::new().unwrap();
        let ctx = BuildContext::new(temp.path(), &PathSettings::default(), &BuildMode::Archive)
            .unwrap();
        assert_eq!(ctx.target("/etc/locale.gen"), ctx.mount_point.join("etc/locale.gen"));
        assert_eq!(ctx.target("/../etc/x"), ctx.mount_point.join("etc/x"));
    }
}
