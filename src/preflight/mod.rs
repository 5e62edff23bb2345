//! Preflight checks for the build host.
//!
//! Run by the binary before any build. A missing tool or a non-root user
//! would otherwise surface halfway through, after the workspace was reset.
//!
//! ```rust
//! use rootfs_builder::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("pacstrap") {
//!     println!("arch-install-scripts not installed");
//! }
//!
//! let tools = &[("bsdtar", "libarchive")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

/// Check if a command exists in `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Host tools a build shells out to, as (command, package).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("pacstrap", "arch-install-scripts"),
    ("arch-chroot", "arch-install-scripts"),
    ("bsdtar", "libarchive"),
    ("mount", "util-linux"),
    ("umount", "util-linux"),
];

/// Check that specific tools are available, listing every missing one.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect();

    if !missing.is_empty() {
        bail!("Missing required host tools:\n{}", missing.join("\n"));
    }
    Ok(())
}

/// Check every tool in [`REQUIRED_TOOLS`].
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}

/// Bootstrapping, chroot and bind mounts all need root.
pub fn require_root() -> Result<()> {
    let euid = nix::unistd::geteuid();
    if !euid.is_root() {
        bail!("rootfs-builder must run as root (effective uid is {})", euid);
    }
    Ok(())
}

/// Everything the binary checks before starting a build.
pub fn check_host() -> Result<()> {
    require_root()?;
    check_host_tools()
}
