//! Manifest validation.
//!
//! Manifest strings end up in the customization script and in file paths
//! inside the target root, so each field is checked against a restrictive
//! character set before anything is touched. All problems are collected and
//! reported together.

use anyhow::{bail, Result};
use std::path::{Component, Path};

use super::Manifest;

/// Validate every manifest field that reaches a command or a path.
pub fn validate(manifest: &Manifest) -> Result<()> {
    let mut problems = Vec::new();

    check(&mut problems, "username", &manifest.username, is_valid_username);
    check(&mut problems, "hostname", &manifest.hostname, is_valid_hostname);

    for (i, entry) in manifest.locale.generate.iter().enumerate() {
        check(&mut problems, &format!("locale.generate[{i}]"), entry, is_valid_locale_entry);
    }
    if let Some(lang) = &manifest.locale.lang {
        check(&mut problems, "locale.lang", lang, is_valid_locale_word);
    }

    for (i, name) in manifest.packages.install.iter().enumerate() {
        check(&mut problems, &format!("packages.install[{i}]"), name, is_valid_package);
    }
    for (i, name) in manifest.packages.remove.iter().enumerate() {
        check(&mut problems, &format!("packages.remove[{i}]"), name, is_valid_package);
    }

    for (scope, user_scope) in [("system", false), ("user", true)] {
        let (enable, disable) = manifest.service_toggles(user_scope);
        for (action, names) in [("enable", enable), ("disable", disable)] {
            for (i, name) in names.iter().enumerate() {
                check(
                    &mut problems,
                    &format!("services.{scope}.{action}[{i}]"),
                    name,
                    is_valid_service,
                );
            }
        }
    }

    for (field, overlays) in [
        ("appendconfig", manifest.append_overlays()),
        ("replaceconfig", manifest.replace_overlays()),
    ] {
        for (i, overlay) in overlays.iter().enumerate() {
            check(&mut problems, &format!("{field}[{i}].path"), &overlay.path, is_valid_target_path);
            check(
                &mut problems,
                &format!("{field}[{i}].content"),
                &overlay.content,
                is_valid_content_path,
            );
        }
    }

    if let Some(key) = &manifest.repo_key {
        check(&mut problems, "repo_key", key, is_valid_key_id);
    }

    for (i, repo) in manifest.use_repos.iter().enumerate() {
        check(&mut problems, &format!("use_repos[{i}]"), repo, is_valid_repo_name);
    }

    if !problems.is_empty() {
        bail!("invalid manifest:\n{}", problems.join("\n"));
    }
    Ok(())
}

fn check(problems: &mut Vec<String>, field: &str, value: &str, valid: fn(&str) -> bool) {
    if !valid(value) {
        problems.push(format!("  {field}: {value:?} is not allowed"));
    }
}

fn is_valid_username(value: &str) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    value.len() <= 32
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn is_valid_hostname(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 253
        && value.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

fn is_valid_package(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('-')
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '+' | '-'))
}

fn is_valid_service(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('-')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | ':' | '-' | '\\'))
}

fn is_valid_locale_word(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '_' | '-'))
}

fn is_valid_locale_entry(value: &str) -> bool {
    value.split(' ').all(is_valid_locale_word)
}

fn is_valid_repo_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_key_id(value: &str) -> bool {
    (8..=40).contains(&value.len()) && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn has_no_traversal(path: &Path) -> bool {
    path.components()
        .all(|component| !matches!(component, Component::ParentDir | Component::Prefix(_)))
}

fn is_valid_target_path(value: &str) -> bool {
    let path = Path::new(value);
    path.is_absolute() && path.components().count() > 1 && has_no_traversal(path)
}

fn is_valid_content_path(value: &str) -> bool {
    !value.is_empty() && has_no_traversal(Path::new(value))
}
