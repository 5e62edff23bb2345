//! pacman-specific build inputs.
//!
//! - [`config`] - `pacman.conf` composition from a base file and repository fragments
//! - [`mirror`] - Mirror list resolution before bootstrap
//! - [`keys`] - Staging of the repository signing key

pub mod config;
pub mod keys;
pub mod mirror;
