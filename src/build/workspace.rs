//! Workspace lifecycle: reset, bind mount, unmount, removal, and the
//! project lock that keeps two builds out of the same workspace.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;

use crate::build::context::BuildContext;
use crate::process::{Cmd, Host};

/// Destroy any previous workspace and create a fresh tree.
pub fn reset(ctx: &BuildContext) -> Result<()> {
    if ctx.workspace.exists() {
        println!("  Removing previous workspace {}", ctx.workspace.display());
        fs::remove_dir_all(&ctx.workspace).with_context(|| {
            format!(
                "removing previous workspace '{}' (is it still mounted?)",
                ctx.workspace.display()
            )
        })?;
    }

    for dir in [&ctx.workspace, &ctx.rootfs_storage] {
        fs::create_dir_all(dir).with_context(|| format!("creating '{}'", dir.display()))?;
    }
    if ctx.automount {
        fs::create_dir_all(&ctx.mount_point)
            .with_context(|| format!("creating mount point '{}'", ctx.mount_point.display()))?;
    }
    Ok(())
}

pub fn bind_mount_command(source: &Path, target: &Path) -> Cmd {
    Cmd::new("mount")
        .arg("--bind")
        .arg_path(source)
        .arg_path(target)
        .error_msg(format!(
            "bind-mounting {} on {} failed (root privileges required)",
            source.display(),
            target.display()
        ))
}

pub fn unmount_command(target: &Path) -> Cmd {
    Cmd::new("umount")
        .arg("-R")
        .arg_path(target)
        .error_msg(format!("unmounting {} failed", target.display()))
}

/// Bind-mount the rootfs storage onto the mount point.
pub fn mount(host: &mut dyn Host, ctx: &BuildContext) -> Result<()> {
    host.run(&bind_mount_command(&ctx.rootfs_storage, &ctx.mount_point))
}

/// Unmount (if we mounted) and then delete the workspace.
///
/// The workspace is only deleted once the unmount succeeded, so a stuck
/// mount is never recursed into.
pub fn teardown(host: &mut dyn Host, ctx: &BuildContext, mounted: bool) -> Result<()> {
    if mounted {
        host.run(&unmount_command(&ctx.mount_point)).with_context(|| {
            format!(
                "workspace '{}' left in place because the unmount failed",
                ctx.workspace.display()
            )
        })?;
    }

    if ctx.workspace.exists() {
        fs::remove_dir_all(&ctx.workspace)
            .with_context(|| format!("removing workspace '{}'", ctx.workspace.display()))?;
    }
    Ok(())
}

/// Exclusive advisory lock on the project, held for a whole build.
#[derive(Debug)]
pub struct ProjectLock {
    file: File,
}

impl ProjectLock {
    /// Take the lock, failing at once if another build holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("opening lock file '{}'", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            bail!(
                "another build is already running in this project (lock '{}')",
                path.display()
            );
        }
        Ok(Self { file })
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
