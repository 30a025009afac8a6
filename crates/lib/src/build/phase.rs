//! Runs recipe phases as shell commands in a scrubbed environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::build::fetch::fetch_source;
use crate::build::worker::{BuildJob, BuildWorker, WorkerError};
use crate::platform::paths;
use crate::repo::{PackageDefinition, RepoPath};
use crate::spec::{DepType, VariantValue};

/// `HOME` for builds; does not exist so nothing leaks in from dotfiles.
const HOMELESS: &str = "/homeless-shelter";

/// 1980-01-01T00:00:00Z, the ZIP epoch.
const SOURCE_DATE_EPOCH: &str = "315532800";

/// Used when no base `PATH` is configured.
pub const DEFAULT_BASE_PATH: &str = "/usr/bin:/bin";

/// Production worker: fetches the version's source if the recipe gives a
/// URL, then runs each phase of the recipe through the shell, in order,
/// inside the job's scratch directory.
#[derive(Debug, Clone)]
pub struct PhaseWorker {
  repos: Arc<RepoPath>,
  base_path: String,
  download_dir: PathBuf,
}

impl PhaseWorker {
  pub fn new(repos: Arc<RepoPath>) -> Self {
    PhaseWorker {
      repos,
      base_path: DEFAULT_BASE_PATH.to_string(),
      download_dir: paths::download_dir(),
    }
  }

  /// Where verified downloads are kept between builds.
  pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.download_dir = dir.into();
    self
  }

  /// Directories appended to `PATH` after dependency `bin` directories.
  pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
    self.base_path = base_path.into();
    self
  }

  fn recipe(&self, job: &BuildJob) -> Result<&Arc<PackageDefinition>, WorkerError> {
    self
      .repos
      .by_namespace(job.spec.namespace())
      .and_then(|repo| repo.get(job.spec.name()))
      .ok_or_else(|| WorkerError::UnknownRecipe {
        namespace: job.spec.namespace().to_string(),
        name: job.spec.name().to_string(),
      })
  }

  /// Downloads and verifies the source, then copies it into the scratch
  /// directory. Recipes without a URL carry their sources themselves.
  async fn fetch(&self, job: &BuildJob, recipe: &PackageDefinition) -> Result<Option<PathBuf>, WorkerError> {
    let Some(version) = recipe.version(job.spec.version()) else {
      return Ok(None);
    };
    let Some(url) = &version.url else {
      return Ok(None);
    };
    append_log(&job.log, &format!("==> fetch: {}", url)).await?;
    let cached = fetch_source(url, &version.sha256, &self.download_dir).await?;
    let Some(file_name) = cached.file_name() else {
      return Ok(None);
    };
    let source = job.scratch.join(file_name);
    tokio::fs::copy(&cached, &source).await?;
    Ok(Some(source))
  }

  fn environment(&self, job: &BuildJob, recipe: &PackageDefinition, source: Option<&Path>) -> BTreeMap<String, String> {
    let spec = &job.spec;
    let tmp = job.scratch.join("tmp");
    let mut env = BTreeMap::new();

    env.insert("prefix".to_string(), path_str(&job.output));
    env.insert("SPACKLE_PREFIX".to_string(), path_str(&job.prefix));
    env.insert("SPACKLE_NAME".to_string(), spec.name().to_string());
    env.insert("SPACKLE_NAMESPACE".to_string(), spec.namespace().to_string());
    env.insert("SPACKLE_VERSION".to_string(), spec.version().to_string());
    env.insert("SPACKLE_HASH".to_string(), spec.hash().to_string());
    env.insert("SPACKLE_COMPILER".to_string(), spec.compiler().name.clone());
    env.insert("SPACKLE_COMPILER_VERSION".to_string(), spec.compiler().version.to_string());
    env.insert("SPACKLE_TARGET".to_string(), spec.target().to_string());
    env.insert("SPACKLE_RECIPE_DIR".to_string(), path_str(&recipe.recipe_dir));
    if let Some(version) = recipe.version(spec.version()) {
      env.insert("SPACKLE_SHA256".to_string(), version.sha256.clone());
      if let Some(url) = &version.url {
        env.insert("SPACKLE_URL".to_string(), url.clone());
      }
    }
    if let Some(source) = source {
      env.insert("SPACKLE_SOURCE".to_string(), path_str(source));
    }
    for (name, value) in spec.variants() {
      let rendered = match value {
        VariantValue::Bool(b) => b.to_string(),
        other => other.values().join(","),
      };
      env.insert(format!("SPACKLE_VARIANT_{}", env_key(name)), rendered);
    }

    let mut path = Vec::new();
    for dep in &job.dependencies {
      env.insert(format!("SPACKLE_DEP_{}", env_key(&dep.name)), path_str(&dep.prefix));
      if dep.types.contains(DepType::Build) || dep.types.contains(DepType::Run) {
        path.push(path_str(&dep.prefix.join("bin")));
      }
    }
    if !self.base_path.is_empty() {
      path.push(self.base_path.clone());
    }
    env.insert("PATH".to_string(), path.join(":"));

    env.insert("HOME".to_string(), HOMELESS.to_string());
    for key in ["TMPDIR", "TMP", "TEMP", "TEMPDIR"] {
      env.insert(key.to_string(), path_str(&tmp));
    }
    env.insert("LANG".to_string(), "C".to_string());
    env.insert("LC_ALL".to_string(), "C".to_string());
    env.insert("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string());
    env
  }
}

impl BuildWorker for PhaseWorker {
  async fn build(&self, job: &BuildJob) -> Result<(), WorkerError> {
    let recipe = self.recipe(job)?;

    tokio::fs::create_dir_all(job.scratch.join("tmp")).await?;
    tokio::fs::create_dir_all(&job.output).await?;

    let source = self.fetch(job, recipe).await?;
    let base_env = self.environment(job, recipe, source.as_deref());

    info!(spec = %job.spec.name(), hash = %job.spec.short_hash(), phases = recipe.phases.len(), "building");
    for phase in &recipe.phases {
      let mut env = base_env.clone();
      env.extend(phase.env.iter().map(|(k, v)| (k.clone(), v.clone())));
      run_phase(&phase.name, &phase.run, &env, &job.scratch, &job.log).await?;
    }
    Ok(())
  }
}

/// Runs one phase with exactly `env` as its environment, appending its
/// output to `log`.
pub async fn run_phase(
  phase: &str,
  cmd: &str,
  env: &BTreeMap<String, String>,
  cwd: &Path,
  log: &Path,
) -> Result<(), WorkerError> {
  debug!(phase = %phase, cmd = %cmd, "running phase");

  let mut log_file = OpenOptions::new().create(true).append(true).open(log).await?;
  log_file.write_all(format!("==> {}: {}\n", phase, cmd).as_bytes()).await?;
  log_file.flush().await?;
  let log_file = log_file.into_std().await;
  let stderr = log_file.try_clone()?;

  // Not $SHELL: interactive shells source profiles that rewrite PATH
  let status = Command::new("/bin/sh")
    .arg("-c")
    .arg(cmd)
    .current_dir(cwd)
    .env_clear()
    .envs(env)
    .stdin(Stdio::null())
    .stdout(Stdio::from(log_file))
    .stderr(Stdio::from(stderr))
    .status()
    .await
    .map_err(|source| WorkerError::Spawn {
      phase: phase.to_string(),
      source,
    })?;

  if !status.success() {
    return Err(WorkerError::PhaseFailed {
      phase: phase.to_string(),
      code: status.code(),
    });
  }
  Ok(())
}

async fn append_log(log: &Path, line: &str) -> std::io::Result<()> {
  let mut file = OpenOptions::new().create(true).append(true).open(log).await?;
  file.write_all(format!("{}\n", line).as_bytes()).await?;
  file.flush().await
}

fn env_key(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
    .collect()
}

fn path_str(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

/// Output directory and log file inside a scratch directory.
pub(crate) fn job_paths(scratch: &Path) -> (PathBuf, PathBuf) {
  (scratch.join("install"), scratch.join(crate::consts::BUILD_LOG))
}
