//! Solve, build and record: what `spackle install` does.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::build::{BuildLayout, BuildOptions, BuildStatus, BuildSummary, BuildWorker, CancelToken, build};
use crate::config::Config;
use crate::db::{DbError, InstallDatabase};
use crate::env::{EnvError, EnvironmentStore};
use crate::graph::ConcretizationGraph;
use crate::graph::lockfile::{Lockfile, LockfileError};
use crate::platform::paths;
use crate::repo::RepoPath;
use crate::solve::{SolveError, SolveOptions, solve};
use crate::spec::AbstractSpec;
use crate::root_lock::{RootLock, RootLockError};

/// Lockfile written into an environment after a successful install.
pub const ENV_LOCKFILE: &str = "spackle.lock";

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("nothing to install")]
  NothingRequested,

  #[error(transparent)]
  Lock(#[from] RootLockError),

  #[error(transparent)]
  Db(#[from] DbError),

  #[error(transparent)]
  Environment(#[from] EnvError),

  #[error(transparent)]
  Solve(#[from] SolveError),

  #[error(transparent)]
  Lockfile(#[from] LockfileError),
}

/// Where and how installs happen.
#[derive(Debug, Clone)]
pub struct InstallSettings {
  pub root: PathBuf,
  pub layout: BuildLayout,
  pub solve: SolveOptions,
  pub build: BuildOptions,
  pub environments: EnvironmentStore,
}

impl InstallSettings {
  pub fn from_config(config: &Config) -> Self {
    InstallSettings {
      root: paths::root_dir(),
      layout: BuildLayout::from_env(),
      solve: config.solve_options(),
      build: config.build_options(),
      environments: EnvironmentStore::default_store(),
    }
  }

  /// Everything under `root`, cache included.
  pub fn under(root: &Path) -> Self {
    InstallSettings {
      root: root.to_path_buf(),
      layout: BuildLayout::under(root),
      solve: SolveOptions::default(),
      build: BuildOptions::default(),
      environments: EnvironmentStore::new(root.join("environments")),
    }
  }

  fn db_dir(&self) -> PathBuf {
    self.root.join("db")
  }
}

#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
  pub specs: Vec<AbstractSpec>,
  /// Also install the environment's specs, and add `specs` to it.
  pub environment: Option<String>,
}

#[derive(Debug)]
pub struct InstallReport {
  pub graph: Arc<ConcretizationGraph>,
  pub summary: BuildSummary,
}

/// Concretizes the request, builds the result and records what got installed.
///
/// Holds the root lock throughout. A solve error aborts before anything is
/// built; build failures are reported in the summary and whatever did build
/// is still recorded.
pub async fn install<W: BuildWorker>(
  request: &InstallRequest,
  repos: &RepoPath,
  worker: Arc<W>,
  settings: &InstallSettings,
  cancel: CancelToken,
) -> Result<InstallReport, InstallError> {
  let _lock = RootLock::for_install(&settings.root, &request.specs, request.environment.as_deref())?;
  let mut db = InstallDatabase::load(&settings.db_dir())?;

  let mut roots = Vec::new();
  let env = match &request.environment {
    Some(name) => Some(settings.environments.read(name)?),
    None => None,
  };
  if let Some(env) = &env {
    roots.extend(env.specs.iter().cloned());
  }
  for spec in &request.specs {
    if !roots.iter().any(|r: &AbstractSpec| r.to_string() == spec.to_string()) {
      roots.push(spec.clone());
    }
  }
  if roots.is_empty() {
    return Err(InstallError::NothingRequested);
  }

  let mut solve_options = settings.solve.clone();
  if solve_options.reuse {
    solve_options.installed = db.specs();
  }
  let graph = Arc::new(solve(&roots, repos, &solve_options)?);
  info!(roots = roots.len(), nodes = graph.len(), "concretized");

  let mut build_options = settings.build.clone();
  build_options.generations = db.generations();
  let summary = build(graph.clone(), worker, settings.layout.clone(), build_options, cancel).await;

  let roots = graph.root_hashes();
  for record in summary.records.values() {
    if record.status != BuildStatus::Built {
      continue;
    }
    let (Some(spec), Some(prefix)) = (graph.get(&record.hash), &record.prefix) else {
      continue;
    };
    let explicit = roots.contains(&record.hash);
    db.record(spec.clone(), prefix.clone(), explicit, record.generation);
  }
  db.save()?;

  if summary.is_success()
    && let Some(env) = &env
  {
    settings.environments.add(&env.name, &request.specs)?;
    Lockfile::from_graph(&graph).save(&env.path.join(ENV_LOCKFILE))?;
  }

  Ok(InstallReport { graph, summary })
}
