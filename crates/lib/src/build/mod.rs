//! Concurrent, dependency-ordered builds of a concretization graph.
//!
//! # Submodules
//!
//! - [`scheduler`] - the coordinator loop and per-node tasks
//! - [`worker`] - the [`BuildWorker`] seam
//! - [`fetch`] - checksum-verified source downloads
//! - [`phase`] - [`PhaseWorker`], which runs recipe phases through the shell
//! - [`stage`] - copying artifacts into install prefixes, with retries
//! - [`cancel`] - [`CancelToken`]

pub mod cancel;
pub mod fetch;
pub mod phase;
pub mod scheduler;
pub mod stage;
mod types;
pub mod worker;

pub use cancel::CancelToken;
pub use phase::PhaseWorker;
pub use scheduler::build;
pub use stage::{InstallMarker, METADATA_DIR, read_install_marker};
pub use types::*;
pub use worker::{BuildJob, BuildWorker, DependencyPrefix, WorkerError};
