//! Builds Arch Linux root filesystem images with pacman.
//!
//! A build reads a JSON manifest and a directory of pacman configuration
//! fragments, bootstraps a target root with `pacstrap`, customizes it by
//! running a generated script inside `arch-chroot`, applies configuration
//! overlays, and either packages the result as a `bsdtar` archive or leaves it
//! on a filesystem the caller mounted (install mode).
//!
//! # Architecture
//!
//! ```text
//! rootfs-builder (binary)
//!     │
//!     ├── settings   builder.toml, every path and image policy
//!     ├── manifest   what goes into the image, validated before anything runs
//!     ├── preflight  root + host tools
//!     │
//!     └── pipeline::Orchestrator ── 15 stages, one driver
//!             ├── pacman    ConfigComposer, mirror list, signing key
//!             ├── build     context, workspace, locale, local repo, overlays
//!             ├── script    typed customization directives
//!             └── artifact  bsdtar archive
//!
//! process::Host ── every external command and the mirror fetch
//! ```

pub mod artifact;
pub mod build;
pub mod manifest;
pub mod pacman;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod script;
pub mod settings;
pub mod timing;

pub use build::context::{BuildContext, BuildMode};
pub use manifest::Manifest;
pub use pacman::config::ConfigComposer;
pub use pipeline::{run_build, BuildOutcome, Orchestrator, Stage};
pub use process::{Cmd, Host, SystemHost};
pub use script::{CustomizationScript, Directive};
pub use settings::Settings;
