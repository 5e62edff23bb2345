//! Locale configuration of the target root.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::manifest::Locale;

const LOCALE_GEN: &str = "etc/locale.gen";
const LOCALE_CONF: &str = "etc/locale.conf";

/// Result of rewriting a `locale.gen` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledLocales {
    pub text: String,
    /// Requested entries with no line in the file, commented or not.
    pub missing: Vec<String>,
}

/// Uncomment the requested entries in a `locale.gen` text.
///
/// A line matches when, after dropping a leading `#` and surrounding
/// whitespace, it equals a requested entry exactly. Other lines are left
/// untouched. Entries with no matching line are reported, not fatal.
pub fn enable_locales<S: AsRef<str>>(locale_gen: &str, requested: &[S]) -> EnabledLocales {
    let mut found = vec![false; requested.len()];
    let mut text = String::with_capacity(locale_gen.len());

    for line in locale_gen.lines() {
        let entry = line.trim().strip_prefix('#').unwrap_or(line.trim()).trim();
        let mut matched = false;
        for (i, wanted) in requested.iter().enumerate() {
            if wanted.as_ref() == entry {
                found[i] = true;
                matched = true;
            }
        }
        text.push_str(if matched { entry } else { line });
        text.push('\n');
    }

    let mut missing: Vec<String> = Vec::new();
    for (wanted, found) in requested.iter().zip(&found) {
        if !found && !missing.iter().any(|m| m == wanted.as_ref()) {
            missing.push(wanted.as_ref().to_string());
        }
    }

    EnabledLocales { text, missing }
}

/// Rewrite `etc/locale.gen` and write `etc/locale.conf` under `target_root`.
pub fn configure(target_root: &Path, locale: &Locale) -> Result<()> {
    let gen_path = target_root.join(LOCALE_GEN);
    let current = fs::read_to_string(&gen_path)
        .with_context(|| format!("reading '{}'", gen_path.display()))?;
    let enabled = enable_locales(&current, &locale.generate);
    fs::write(&gen_path, &enabled.text)
        .with_context(|| format!("writing '{}'", gen_path.display()))?;
    for entry in &enabled.missing {
        eprintln!("  warning: locale '{}' not listed in {}; skipped", entry, LOCALE_GEN);
    }
    println!(
        "  Enabled {} locale(s)",
        locale.generate.len() - enabled.missing.len()
    );

    match &locale.lang {
        Some(lang) => {
            let conf_path = target_root.join(LOCALE_CONF);
            fs::write(&conf_path, format!("LANG={lang}\n"))
                .with_context(|| format!("writing '{}'", conf_path.display()))?;
            println!("  LANG={}", lang);
        }
        None => println!("  No locale.lang set; leaving {} alone", LOCALE_CONF),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LOCALE_GEN_SAMPLE: &str = "\
# Configuration file for locale-gen
#
#en_GB.UTF-8 UTF-8
#en_US ISO-8859-1
#en_US.UTF-8 UTF-8
#ja_JP.UTF-8 UTF-8
";

    #[test]
    fn test_uncomments_only_requested_lines() {
        let out = enable_locales(LOCALE_GEN_SAMPLE, &["en_US.UTF-8 UTF-8"]);
        assert_eq!(
            out.text,
            "\
# Configuration file for locale-gen
#
#en_GB.UTF-8 UTF-8
#en_US ISO-8859-1
en_US.UTF-8 UTF-8
#ja_JP.UTF-8 UTF-8
"
        );
        assert!(out.missing.is_empty());
    }

    #[test]
    fn test_prefix_does_not_match_longer_entry() {
        let out = enable_locales(LOCALE_GEN_SAMPLE, &["en_US ISO-8859-1"]);
        assert!(out.text.contains("\nen_US ISO-8859-1\n"));
        assert!(out.text.contains("#en_US.UTF-8 UTF-8"));
    }

    #[test]
    fn test_already_enabled_is_kept() {
        let out = enable_locales("en_US.UTF-8 UTF-8\n", &["en_US.UTF-8 UTF-8"]);
        assert_eq!(out.text, "en_US.UTF-8 UTF-8\n");
    }

    #[test]
    fn test_duplicate_request_is_enabled_once() {
        let out = enable_locales(
            "#en_US.UTF-8 UTF-8\n",
            &["en_US.UTF-8 UTF-8", "en_US.UTF-8 UTF-8"],
        );
        assert_eq!(out.text, "en_US.UTF-8 UTF-8\n");
        assert!(out.missing.is_empty());
    }

    #[test]
    fn test_unknown_locale_leaves_file_unchanged() {
        let out = enable_locales(LOCALE_GEN_SAMPLE, &["de_DE.UTF-8 UTF-8"]);
        assert_eq!(out.text, LOCALE_GEN_SAMPLE);
        assert_eq!(out.missing, ["de_DE.UTF-8 UTF-8"]);
    }

    #[test]
    fn test_configure_skips_unknown_locale() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("etc")).unwrap();
        fs::write(temp.path().join(LOCALE_GEN), LOCALE_GEN_SAMPLE).unwrap();

        let locale = Locale {
            generate: vec!["de_DE.UTF-8 UTF-8".into(), "ja_JP.UTF-8 UTF-8".into()],
            lang: None,
        };
        configure(temp.path(), &locale).unwrap();

        let gen = fs::read_to_string(temp.path().join(LOCALE_GEN)).unwrap();
        assert!(gen.contains("\nja_JP.UTF-8 UTF-8\n"));
        assert!(!gen.contains("de_DE"));
    }

    #[test]
    fn test_configure_writes_both_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("etc")).unwrap();
        fs::write(temp.path().join(LOCALE_GEN), LOCALE_GEN_SAMPLE).unwrap();

        let locale = Locale {
            generate: vec!["en_US.UTF-8 UTF-8".into(), "ja_JP.UTF-8 UTF-8".into()],
            lang: Some("ja_JP.UTF-8".into()),
        };
        configure(temp.path(), &locale).unwrap();

        let gen = fs::read_to_string(temp.path().join(LOCALE_GEN)).unwrap();
        assert!(gen.contains("\nen_US.UTF-8 UTF-8\n"));
        assert!(gen.contains("\nja_JP.UTF-8 UTF-8\n"));
        assert_eq!(
            fs::read_to_string(temp.path().join(LOCALE_CONF)).unwrap(),
            "LANG=ja_JP.UTF-8\n"
        );
    }

    #[test]
    fn test_configure_without_lang() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("etc")).unwrap();
        fs::write(temp.path().join(LOCALE_GEN), LOCALE_GEN_SAMPLE).unwrap();

        let locale = Locale {
            generate: vec![],
            lang: None,
        };
        configure(temp.path(), &locale).unwrap();
        assert!(!temp.path().join(LOCALE_CONF).exists());
    }
}
