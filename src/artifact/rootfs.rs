//! Root filesystem archive.
//!
//! The finished target root is captured with `bsdtar`, keeping ownership,
//! permissions, ACLs and extended attributes. The compression is chosen by
//! `bsdtar` from the archive suffix (`.tar.gz` → gzip).

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::artifact::filesystem::recreate_dir;
use crate::process::{Cmd, Host};

/// The archiving command for `source_dir` → `archive`.
pub fn archive_command(source_dir: &Path, archive: &Path) -> Cmd {
    Cmd::new("bsdtar")
        .args(["--acls", "--xattrs"])
        .arg("-cpaf")
        .arg_path(archive)
        .arg("-C")
        .arg_path(source_dir)
        .arg(".")
        .error_msg(format!("bsdtar failed to archive {}", source_dir.display()))
}

/// Archive `source_dir` into `archive`.
///
/// The directory holding `archive` is emptied first, so it ends up holding
/// exactly one artifact.
pub fn package_rootfs(host: &mut dyn Host, source_dir: &Path, archive: &Path) -> Result<PathBuf> {
    if !source_dir.exists() {
        bail!("Source directory does not exist: {}", source_dir.display());
    }
    if !source_dir.is_dir() {
        bail!("Source path is not a directory: {}", source_dir.display());
    }

    let entries = WalkDir::new(source_dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .count();
    println!("  Packaging {} entries from {}", entries, source_dir.display());

    let output_dir = archive
        .parent()
        .with_context(|| format!("archive path '{}' has no parent", archive.display()))?;
    recreate_dir(output_dir)?;
    host.run(&archive_command(source_dir, archive))?;

    if !archive.is_file() {
        bail!(
            "archiver finished but archive is missing: {}",
            archive.display()
        );
    }

    let metadata = fs::metadata(archive)
        .with_context(|| format!("reading metadata '{}'", archive.display()))?;
    let digest = sha256_file(archive)?;
    println!(
        "  Archive created: {} ({} MB, sha256 {})",
        archive.display(),
        metadata.len() / 1024 / 1024,
        digest
    );

    Ok(archive.to_path_buf())
}

/// Hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("opening '{}' for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading '{}' for hashing", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}
