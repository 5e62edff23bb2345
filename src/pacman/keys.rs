//! Repository signing key staging.
//!
//! The key file is copied to the top of the target root so the customization
//! script can import and locally sign it with `pacman-key`. It is removed again
//! once the script has run.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Key file name inside the target root.
pub const STAGED_KEY: &str = "pgp_key.asc";

/// Absolute path of the staged key as seen from inside the chroot.
pub fn staged_key_chroot_path() -> String {
    format!("/{STAGED_KEY}")
}

/// Check that `key_file` exists and looks like an armored public key.
pub fn verify_key_file(key_file: &Path) -> Result<()> {
    if !key_file.is_file() {
        bail!(
            "repo_key is set but key file does not exist: {}",
            key_file.display()
        );
    }

    let content = fs::read_to_string(key_file)
        .with_context(|| format!("Failed to read key file: {}", key_file.display()))?;

    if !content.contains("BEGIN PGP PUBLIC KEY BLOCK") {
        bail!(
            "Key file {} does not contain an ASCII-armored PGP public key",
            key_file.display()
        );
    }
    Ok(())
}

/// Copy the signing key into the target root.
pub fn stage_key(key_file: &Path, target_root: &Path) -> Result<()> {
    verify_key_file(key_file)?;

    let staged = target_root.join(STAGED_KEY);
    fs::copy(key_file, &staged).with_context(|| {
        format!(
            "Failed to copy key '{}' to '{}'",
            key_file.display(),
            staged.display()
        )
    })?;

    println!("  Repository signing key staged");
    Ok(())
}

/// Remove the staged key, if present.
pub fn remove_staged_key(target_root: &Path) -> Result<()> {
    let staged = target_root.join(STAGED_KEY);
    if staged.exists() {
        fs::remove_file(&staged)
            .with_context(|| format!("Failed to remove staged key: {}", staged.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ARMORED: &str =
        "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nmQINBF...\n-----END PGP PUBLIC KEY BLOCK-----\n";

    #[test]
    fn test_stage_and_remove_key() {
        let temp = TempDir::new().unwrap();
        let key = temp.path().join("pgp_key.asc");
        fs::write(&key, ARMORED).unwrap();
        let root = temp.path().join("root");
        fs::create_dir_all(&root).unwrap();

        stage_key(&key, &root).unwrap();
        assert_eq!(fs::read_to_string(root.join(STAGED_KEY)).unwrap(), ARMORED);

        remove_staged_key(&root).unwrap();
        assert!(!root.join(STAGED_KEY).exists());
        // Removing twice is fine
        remove_staged_key(&root).unwrap();
    }

    #[test]
    fn test_missing_key_file() {
        let temp = TempDir::new().unwrap();
        let err = verify_key_file(&temp.path().join("pgp_key.asc")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_key_without_armor() {
        let temp = TempDir::new().unwrap();
        let key = temp.path().join("pgp_key.asc");
        fs::write(&key, "not a key").unwrap();
        let err = verify_key_file(&key).unwrap_err();
        assert!(err.to_string().contains("ASCII-armored"));
    }

    #[test]
    fn test_chroot_path() {
        assert_eq!(staged_key_chroot_path(), "/pgp_key.asc");
    }
}
