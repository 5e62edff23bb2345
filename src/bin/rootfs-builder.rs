use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rootfs_builder::build::workspace::ProjectLock;
use rootfs_builder::{
    preflight, run_build, BuildContext, BuildMode, BuildOutcome, Manifest, Settings, SystemHost,
};

fn usage() -> &'static str {
    "Usage:\n  rootfs-builder                     build the image archive\n  rootfs-builder install <mountpoint>  build directly onto a mounted filesystem"
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mode = match args.as_slice() {
        [] => BuildMode::Archive,
        [install, mount_point] if install == "install" => BuildMode::Install {
            mount_point: PathBuf::from(mount_point),
        },
        _ => bail!(usage()),
    };

    let project_root = std::env::current_dir().context("resolving current directory")?;
    build(&project_root, &mode)
}

fn build(project_root: &Path, mode: &BuildMode) -> Result<()> {
    let settings = Settings::load(project_root)?;
    let ctx = BuildContext::new(project_root, &settings.paths, mode)?;
    let _lock = ProjectLock::acquire(&ctx.lock_file)?;

    let manifest_path = ctx.project_path(&settings.paths.manifest);
    let manifest = Manifest::load(&manifest_path)?;

    preflight::check_host().context("host is not ready to build")?;

    println!(
        "[rootfs] building '{}' ({})",
        manifest.hostname,
        match mode {
            BuildMode::Archive => "archive".to_string(),
            BuildMode::Install { .. } => format!("install to {}", ctx.mount_point.display()),
        }
    );

    let mut host = SystemHost;
    match run_build(&mut host, &manifest, &settings, &ctx)? {
        BuildOutcome::Archive(archive) => {
            println!("[rootfs] done: {}", archive.display());
        }
        BuildOutcome::Installed(target) => {
            println!("[rootfs] done: root filesystem installed to {}", target.display());
        }
    }
    Ok(())
}
