//! Typed external command execution.
//!
//! Every external tool the build touches (mount, pacstrap, arch-chroot, bsdtar)
//! is invoked through [`Cmd`]: a program name plus an argument vector. Nothing
//! is ever passed through `sh -c`, so manifest data cannot change the shape
//! of a command line.
//!
//! The [`Host`] trait is the seam between the build pipeline and the machine it
//! runs on. [`SystemHost`] performs real work; tests substitute a recorder.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

/// Builder for a single external process call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    /// Custom error message prefix.
    error_prefix: Option<String>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            error_prefix: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set a custom error message prefix.
    pub fn error_msg(mut self, msg: impl AsRef<str>) -> Self {
        self.error_prefix = Some(msg.as_ref().to_string());
        self
    }

    /// Program name (first element of argv).
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments after the program name.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    fn failure_prefix(&self) -> String {
        match &self.error_prefix {
            Some(msg) => format!("{} ('{}')", msg, self),
            None => format!("'{}' failed", self),
        }
    }

    /// Run the command with inherited stdio, failing on non-zero exit.
    ///
    /// Output goes directly to the terminal so the user sees package manager
    /// progress as it happens.
    pub fn run_interactive(&self) -> Result<()> {
        let mut cmd = self.command();
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let status = cmd
            .status()
            .with_context(|| format!("Failed to execute '{}'. Is it installed?", self.program))?;

        if !status.success() {
            bail!(
                "{} (exit code {})",
                self.failure_prefix(),
                status.code().unwrap_or(-1)
            );
        }
        Ok(())
    }
}

impl fmt::Display for Cmd {
    /// Shell-quoted command line, for logs and error messages only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let argv = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        write!(f, "{}", shell_words::join(argv))
    }
}

/// External effects the build pipeline needs from the machine it runs on.
pub trait Host {
    /// Run a process to completion, failing on non-zero exit.
    fn run(&mut self, cmd: &Cmd) -> Result<()>;

    /// Fetch a text document over HTTP(S).
    fn fetch_text(&mut self, url: &str) -> Result<String>;
}

/// The real host: spawns processes and talks to the network.
#[derive(Debug, Default)]
pub struct SystemHost;

impl Host for SystemHost {
    fn run(&mut self, cmd: &Cmd) -> Result<()> {
        println!("  $ {}", cmd);
        cmd.run_interactive()
    }

    fn fetch_text(&mut self, url: &str) -> Result<String> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("rootfs-builder/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .get(url)
            .send()
            .with_context(|| format!("HTTP request failed: {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                "HTTP {} for {}: {}",
                status.as_u16(),
                url,
                status.canonical_reason().unwrap_or("Unknown error")
            );
        }

        response
            .text()
            .with_context(|| format!("reading response body from {}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_success() {
        Cmd::new("true").run_interactive().unwrap();
    }

    #[test]
    fn test_missing_program() {
        let err = Cmd::new("definitely_not_a_real_command_12345")
            .run_interactive()
            .unwrap_err();
        assert!(err.to_string().contains("Is it installed?"));
    }

    #[test]
    fn test_custom_error_message_keeps_command_line() {
        let err = Cmd::new("false")
            .arg("--flag")
            .error_msg("bootstrap step failed")
            .run_interactive()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bootstrap step failed"));
        assert!(msg.contains("'false --flag'"));
    }

    #[test]
    fn test_default_error_names_the_command_line() {
        let err = Cmd::new("false").arg("--flag").run_interactive().unwrap_err();
        assert!(err.to_string().contains("'false --flag' failed (exit code 1)"));
    }

    #[test]
    fn test_arguments_are_not_shell_interpreted() {
        // Through a shell this would run `false` and fail.
        Cmd::new("test").arg("x; false").run_interactive().unwrap();
    }

    #[test]
    fn test_display_quotes_arguments() {
        let cmd = Cmd::new("mount")
            .arg("--bind")
            .arg_path(Path::new("/tmp/with space"))
            .arg("/mnt");
        assert_eq!(cmd.to_string(), "mount --bind '/tmp/with space' /mnt");
    }

    #[test]
    fn test_accessors() {
        let cmd = Cmd::new("bsdtar").args(["-C", "/mnt"]).arg(".");
        assert_eq!(cmd.program(), "bsdtar");
        assert_eq!(cmd.arguments(), ["-C", "/mnt", "."]);
    }
}
