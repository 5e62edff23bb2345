//! Customization script: typed directives rendered to a bash script.
//!
//! The script is the program run once inside the target root via
//! `arch-chroot`. It is kept as an ordered list of [`Directive`] values so
//! that what the build does to the image can be inspected and tested without
//! rendering or executing anything.
//!
//! Every directive renders to exactly one line. Values that come from data
//! (user names, package names, paths) are shell-quoted.
//!
//! # Example
//!
//! ```rust
//! use rootfs_builder::script::{CustomizationScript, Directive};
//!
//! let mut script = CustomizationScript::new();
//! script.append(Directive::SetOption('e'));
//! script.append(Directive::InstallPackages(vec!["base".into(), "vim".into()]));
//!
//! assert_eq!(
//!     script.render(),
//!     "#!/bin/bash\nset -e\npacman -S base vim --noconfirm\n"
//! );
//! ```

pub mod customize;

pub use customize::customization_script;

use std::fmt;

/// Interpreter line at the top of every rendered script.
pub const INTERPRETER: &str = "#!/bin/bash";

/// Service scope for `systemctl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceScope {
    System,
    /// All users (`systemctl --global`).
    User,
}

/// One line of the customization script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    // ─────────────────────────────────────────────────────────────────────
    // Shell behaviour
    // ─────────────────────────────────────────────────────────────────────
    /// `set -<flag>`
    SetOption(char),

    // ─────────────────────────────────────────────────────────────────────
    // Locale and keyring
    // ─────────────────────────────────────────────────────────────────────
    LocaleGen,
    KeyringInit,
    KeyringPopulate,
    /// Import a key file into the pacman keyring.
    KeyAdd(String),
    /// Locally sign (trust) a key id.
    KeyLocalSign(String),

    // ─────────────────────────────────────────────────────────────────────
    // Packages
    // ─────────────────────────────────────────────────────────────────────
    /// Force-refresh all sync databases.
    SyncDatabases,
    /// An empty list renders as a shell no-op.
    InstallPackages(Vec<String>),
    /// Remove packages with their dependents and unneeded dependencies.
    /// An empty list renders as a shell no-op.
    RemovePackages(Vec<String>),

    // ─────────────────────────────────────────────────────────────────────
    // Services
    // ─────────────────────────────────────────────────────────────────────
    EnableService { unit: String, scope: ServiceScope },
    DisableService { unit: String, scope: ServiceScope },

    // ─────────────────────────────────────────────────────────────────────
    // Users and access
    // ─────────────────────────────────────────────────────────────────────
    LockPassword(String),
    CreateGroup { name: String, system: bool },
    CreateUser { name: String, groups: Vec<String> },
    SetPassword { user: String, password: String },
    /// Strip a leading `# ` from lines matching `pattern` (literal text).
    Uncomment { file: String, pattern: String },

    // ─────────────────────────────────────────────────────────────────────
    // Files
    // ─────────────────────────────────────────────────────────────────────
    /// Overwrite `path` with `content` plus a trailing newline.
    WriteFile { path: String, content: String },
    /// Download `url` into directory `dir`, keeping the remote file name.
    Download { url: String, dir: String },
    /// Replace the first literal occurrence of `from` with `to` on each line.
    Substitute { file: String, from: String, to: String },
    RemoveTree(String),
    /// Remove everything inside a directory, keeping the directory.
    ClearDir(String),
    RemoveFile(String),
    Move { from: String, to: String },

    // ─────────────────────────────────────────────────────────────────────
    // Session manager
    // ─────────────────────────────────────────────────────────────────────
    SetLoginManager { tool: String, manager: String },
    RegisterSession {
        tool: String,
        name: String,
        session: String,
        logout: Option<String>,
    },
    SetDefaultSession { tool: String, name: String },
    EnableAutologin { tool: String, user: String },
}

fn q(value: &str) -> std::borrow::Cow<'_, str> {
    shell_words::quote(value)
}

/// Escape a literal for use inside a basic sed regex delimited by `delim`.
fn sed_regex_literal(value: &str, delim: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '.' | '*' | '[' | ']' | '^' | '$') || c == delim {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a literal for use as sed replacement text delimited by `delim`.
fn sed_replacement_literal(value: &str, delim: char) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '&') || c == delim {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::SetOption(flag) => write!(f, "set -{flag}"),
            Directive::LocaleGen => write!(f, "locale-gen"),
            Directive::KeyringInit => write!(f, "pacman-key --init"),
            Directive::KeyringPopulate => write!(f, "pacman-key --populate"),
            Directive::KeyAdd(path) => write!(f, "pacman-key -a {}", q(path)),
            Directive::KeyLocalSign(id) => write!(f, "pacman-key --lsign-key {}", q(id)),
            Directive::SyncDatabases => write!(f, "pacman -Syy --noconfirm"),
            Directive::InstallPackages(packages) if packages.is_empty() => {
                write!(f, ": nothing to install")
            }
            Directive::InstallPackages(packages) => {
                write!(f, "pacman -S {} --noconfirm", shell_words::join(packages))
            }
            Directive::RemovePackages(packages) if packages.is_empty() => {
                write!(f, ": nothing to remove")
            }
            Directive::RemovePackages(packages) => {
                write!(f, "pacman -Rcs {} --noconfirm", shell_words::join(packages))
            }
            Directive::EnableService { unit, scope } | Directive::DisableService { unit, scope } => {
                let action = if matches!(self, Directive::EnableService { .. }) {
                    "enable"
                } else {
                    "disable"
                };
                match scope {
                    ServiceScope::System => write!(f, "systemctl {action} {}", q(unit)),
                    ServiceScope::User => write!(f, "systemctl --global {action} {}", q(unit)),
                }
            }
            Directive::LockPassword(user) => write!(f, "passwd --lock {}", q(user)),
            Directive::CreateGroup { name, system } => {
                if *system {
                    write!(f, "groupadd -r {}", q(name))
                } else {
                    write!(f, "groupadd {}", q(name))
                }
            }
            Directive::CreateUser { name, groups } => {
                write!(f, "useradd -m {}", q(name))?;
                if !groups.is_empty() {
                    let groups: Vec<_> = groups.iter().map(|group| q(group)).collect();
                    write!(f, " -G {}", groups.join(","))?;
                }
                Ok(())
            }
            Directive::SetPassword { user, password } => {
                write!(f, "echo {}:{} | chpasswd", q(user), q(password))
            }
            Directive::Uncomment { file, pattern } => {
                let expr = format!("/{}/s/^# //g", sed_regex_literal(pattern, '/'));
                write!(f, "sed -i {} {}", q(&expr), q(file))
            }
            Directive::WriteFile { path, content } => {
                write!(f, "echo {} > {}", q(content), q(path))
            }
            Directive::Download { url, dir } => {
                write!(f, "curl -fL --output-dir {} -O {}", q(dir), q(url))
            }
            Directive::Substitute { file, from, to } => {
                let expr = format!(
                    "s,{},{},",
                    sed_regex_literal(from, ','),
                    sed_replacement_literal(to, ',')
                );
                write!(f, "sed -i {} {}", q(&expr), q(file))
            }
            Directive::RemoveTree(path) => write!(f, "rm -rf {}", q(path)),
            Directive::ClearDir(path) => write!(f, "rm -rf {}/*", q(path)),
            Directive::RemoveFile(path) => write!(f, "rm -f {}", q(path)),
            Directive::Move { from, to } => write!(f, "mv {} {}", q(from), q(to)),
            Directive::SetLoginManager { tool, manager } => {
                write!(f, "{} login set-manager {}", q(tool), q(manager))
            }
            Directive::RegisterSession {
                tool,
                name,
                session,
                logout,
            } => {
                write!(f, "{} session register -n {} -s {}", q(tool), q(name), q(session))?;
                if let Some(logout) = logout {
                    write!(f, " -l {}", q(logout))?;
                }
                Ok(())
            }
            Directive::SetDefaultSession { tool, name } => {
                write!(f, "{} session set-default {}", q(tool), q(name))
            }
            Directive::EnableAutologin { tool, user } => {
                write!(f, "{} login autologin enable --user {}", q(tool), q(user))
            }
        }
    }
}

/// Ordered directive list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomizationScript {
    directives: Vec<Directive>,
}

impl CustomizationScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one directive at the end. Contents are not validated.
    pub fn append(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Interpreter line followed by one line per directive.
    pub fn render(&self) -> String {
        let mut script = String::from(INTERPRETER);
        script.push('\n');
        for directive in &self.directives {
            script.push_str(&directive.to_string());
            script.push('\n');
        }
        script
    }
}
