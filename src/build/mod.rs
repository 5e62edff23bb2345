//! Build state and the file-level steps that act on the target root.
//!
//! - [`context`] - every path a build touches
//! - [`workspace`] - reset, mount, teardown, project lock
//! - [`locale`] - `locale.gen` / `locale.conf`
//! - [`local_repo`] - staging of locally built packages
//! - [`overlay`] - append/replace configuration overlays

pub mod context;
pub mod local_repo;
pub mod locale;
pub mod overlay;
pub mod workspace;
