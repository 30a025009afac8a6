//! Records, options and results of a build run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::paths;
use crate::spec::ConcreteSpec;
use crate::store::StoreError;
use crate::util::hash::SpecHash;

/// Lifecycle of one node in a build run.
///
/// `NotBuilt` nodes were never dispatched, either because they are still
/// waiting when the run ends or because the run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStatus {
  NotBuilt,
  Building,
  Built,
  Failed,
}

impl BuildStatus {
  pub fn is_final(&self) -> bool {
    matches!(self, BuildStatus::Built | BuildStatus::Failed)
  }
}

impl std::fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      BuildStatus::NotBuilt => "not-built",
      BuildStatus::Building => "building",
      BuildStatus::Built => "built",
      BuildStatus::Failed => "failed",
    };
    write!(f, "{}", s)
  }
}

/// Where a built node's artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOrigin {
  Built,
  Cached,
}

/// Why a node failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BuildFailure {
  /// The worker itself failed (or panicked).
  Direct { message: String },
  /// Skipped because a dependency failed.
  Propagated { from: SpecHash },
  /// Staging or storing kept failing after every retry.
  Io { attempts: u32, message: String },
}

impl std::fmt::Display for BuildFailure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BuildFailure::Direct { message } => write!(f, "{}", message),
      BuildFailure::Propagated { from } => write!(f, "dependency {} failed", from.short()),
      BuildFailure::Io { attempts, message } => write!(f, "{} (after {} attempts)", message, attempts),
    }
  }
}

/// Per-node state, owned and mutated by the coordinator only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
  pub hash: SpecHash,
  pub name: String,
  pub generation: u32,
  pub status: BuildStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub origin: Option<BuildOrigin>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub prefix: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub log: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failure: Option<BuildFailure>,
}

impl BuildRecord {
  pub fn new(spec: &ConcreteSpec, generation: u32) -> Self {
    BuildRecord {
      hash: spec.hash().clone(),
      name: spec.name().to_string(),
      generation,
      status: BuildStatus::NotBuilt,
      origin: None,
      prefix: None,
      log: None,
      failure: None,
    }
  }

  /// Moves a pending record to `Building`. Returns false if it was not pending.
  pub(crate) fn start(&mut self) -> bool {
    if self.status != BuildStatus::NotBuilt {
      return false;
    }
    self.status = BuildStatus::Building;
    true
  }

  /// Finalizes as built. A record is finalized at most once.
  pub(crate) fn succeed(&mut self, origin: BuildOrigin, prefix: PathBuf, log: Option<PathBuf>) -> bool {
    if self.status.is_final() {
      return false;
    }
    self.status = BuildStatus::Built;
    self.origin = Some(origin);
    self.prefix = Some(prefix);
    self.log = log;
    true
  }

  /// Finalizes as failed. A record is finalized at most once.
  pub(crate) fn fail(&mut self, failure: BuildFailure, log: Option<PathBuf>) -> bool {
    if self.status.is_final() {
      return false;
    }
    self.status = BuildStatus::Failed;
    self.failure = Some(failure);
    self.log = log;
    true
  }
}

/// Tuning for a build run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
  /// Maximum number of nodes in flight.
  pub jobs: usize,
  /// Extra attempts for transient staging and store I/O.
  pub io_retries: u32,
  /// Delay before the first retry; doubles on each further attempt.
  pub retry_backoff: Duration,
  /// Keep scratch directories after a successful build.
  pub keep_stage: bool,
  /// Generations of earlier installs, keyed by spec hash.
  pub generations: BTreeMap<SpecHash, u32>,
}

impl Default for BuildOptions {
  fn default() -> Self {
    Self {
      jobs: num_cpus(),
      io_retries: 3,
      retry_backoff: Duration::from_millis(100),
      keep_stage: false,
      generations: BTreeMap::new(),
    }
  }
}

impl BuildOptions {
  pub(crate) fn generation_for(&self, hash: &SpecHash) -> u32 {
    self.generations.get(hash).map(|g| g + 1).unwrap_or(1)
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Directories a build run works in.
#[derive(Debug, Clone)]
pub struct BuildLayout {
  /// Parent of per-node scratch directories.
  pub stage: PathBuf,
  /// Parent of install prefixes.
  pub opt: PathBuf,
  /// Artifact cache root.
  pub cache: PathBuf,
}

impl BuildLayout {
  /// Layout under the configured spackle root and cache.
  pub fn from_env() -> Self {
    BuildLayout {
      stage: paths::stage_dir(),
      opt: paths::install_dir(),
      cache: paths::artifact_cache_dir(),
    }
  }

  /// Everything under one directory; handy for tests and throwaway roots.
  pub fn under(root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    BuildLayout {
      stage: root.join("stage"),
      opt: root.join("opt"),
      cache: root.join("cache"),
    }
  }

  pub fn scratch_dir(&self, spec: &ConcreteSpec) -> PathBuf {
    self.stage.join(format!("{}-{}", spec.name(), spec.hash()))
  }

  pub fn prefix(&self, spec: &ConcreteSpec) -> PathBuf {
    self.opt.join(spec.prefix_name())
  }
}

/// Outcome of a whole run: one record per graph node.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
  pub records: BTreeMap<SpecHash, BuildRecord>,
  pub cancelled: bool,
}

impl BuildSummary {
  pub fn get(&self, hash: &SpecHash) -> Option<&BuildRecord> {
    self.records.get(hash)
  }

  fn with_status(&self, status: BuildStatus) -> impl Iterator<Item = &BuildRecord> {
    self.records.values().filter(move |r| r.status == status)
  }

  /// Nodes the worker built in this run.
  pub fn built(&self) -> Vec<&BuildRecord> {
    self
      .with_status(BuildStatus::Built)
      .filter(|r| r.origin == Some(BuildOrigin::Built))
      .collect()
  }

  /// Nodes satisfied from the artifact cache.
  pub fn cached(&self) -> Vec<&BuildRecord> {
    self
      .with_status(BuildStatus::Built)
      .filter(|r| r.origin == Some(BuildOrigin::Cached))
      .collect()
  }

  /// Nodes that failed themselves, including exhausted I/O retries.
  pub fn failed(&self) -> Vec<&BuildRecord> {
    self
      .with_status(BuildStatus::Failed)
      .filter(|r| !matches!(r.failure, Some(BuildFailure::Propagated { .. })))
      .collect()
  }

  /// Nodes skipped because a dependency failed.
  pub fn propagated(&self) -> Vec<&BuildRecord> {
    self
      .with_status(BuildStatus::Failed)
      .filter(|r| matches!(r.failure, Some(BuildFailure::Propagated { .. })))
      .collect()
  }

  pub fn not_built(&self) -> Vec<&BuildRecord> {
    self.with_status(BuildStatus::NotBuilt).collect()
  }

  pub fn is_success(&self) -> bool {
    !self.cancelled && self.records.values().all(|r| r.status == BuildStatus::Built)
  }
}

/// Errors raised while preparing or finishing a node, before they are
/// classified into a [`BuildFailure`].
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("failed to prepare scratch directory {path}: {source}")]
  Scratch {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("background task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}
