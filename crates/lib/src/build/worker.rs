//! The seam between the scheduler and whatever actually compiles a package.

use std::future::Future;
use std::path::PathBuf;

use thiserror::Error;

use crate::spec::{ConcreteSpec, DepTypes};

/// A dependency that is already installed when its dependent builds.
#[derive(Debug, Clone)]
pub struct DependencyPrefix {
  pub name: String,
  pub prefix: PathBuf,
  pub types: DepTypes,
}

/// Everything a worker needs to build one node.
#[derive(Debug, Clone)]
pub struct BuildJob {
  pub spec: ConcreteSpec,
  /// Private working directory, recreated for every attempt.
  pub scratch: PathBuf,
  /// Directory the worker installs into; becomes the artifact.
  pub output: PathBuf,
  /// Log file inside `scratch`.
  pub log: PathBuf,
  /// Final install prefix, for recipes that need to know it.
  pub prefix: PathBuf,
  pub dependencies: Vec<DependencyPrefix>,
}

#[derive(Debug, Error)]
pub enum WorkerError {
  #[error("no recipe for {namespace}.{name}")]
  UnknownRecipe { namespace: String, name: String },

  #[error("phase '{phase}' failed with exit code {code:?}")]
  PhaseFailed { phase: String, code: Option<i32> },

  #[error("failed to run phase '{phase}': {source}")]
  Spawn {
    phase: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to fetch {url}: {message}")]
  Fetch { url: String, message: String },

  #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
  ChecksumMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("{0}")]
  Other(String),
}

/// Builds a single node into `job.output`.
///
/// Called at most once per hash per run, from a task of its own. Failures are
/// final for the run; the scheduler does not retry them.
pub trait BuildWorker: Send + Sync + 'static {
  fn build(&self, job: &BuildJob) -> impl Future<Output = Result<(), WorkerError>> + Send;
}
