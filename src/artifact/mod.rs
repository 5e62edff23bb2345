//! Build outputs.
//!
//! - [`filesystem`] - directory copy/move helpers
//! - [`rootfs`] - the `bsdtar` root filesystem archive

pub mod filesystem;
pub mod rootfs;
