//! User configuration, read from TOML.
//!
//! ```toml
//! [build]
//! jobs = 8
//! io_retries = 3
//! retry_backoff_ms = 100
//! keep_stage = false
//! base_path = "/usr/bin:/bin"
//!
//! [solver]
//! reuse = true
//! target = "x86_64-linux"
//!
//! [[compilers]]
//! name = "gcc"
//! version = "12.2.0"
//!
//! [repos]
//! paths = ["~/repos/mine", "/srv/spackle/builtin"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::build::BuildOptions;
use crate::build::phase::DEFAULT_BASE_PATH;
use crate::platform::paths;
use crate::solve::SolveOptions;
use crate::spec::{Compiler, Version};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub build: BuildConfig,
  pub solver: SolverConfig,
  pub compilers: Vec<CompilerConfig>,
  pub repos: ReposConfig,
  /// Directory of the file this was read from; relative repo paths resolve
  /// against it.
  #[serde(skip)]
  pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
  /// Parallel builds; the number of CPUs if unset.
  pub jobs: Option<usize>,
  pub io_retries: u32,
  pub retry_backoff_ms: u64,
  pub keep_stage: bool,
  pub base_path: String,
}

impl Default for BuildConfig {
  fn default() -> Self {
    BuildConfig {
      jobs: None,
      io_retries: 3,
      retry_backoff_ms: 100,
      keep_stage: false,
      base_path: DEFAULT_BASE_PATH.to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
  pub reuse: bool,
  pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
  pub name: String,
  pub version: Version,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReposConfig {
  pub paths: Vec<PathBuf>,
}

impl Config {
  /// Reads `$SPACKLE_CONFIG` or the default config file.
  pub fn load_default() -> Result<Self, ConfigError> {
    Self::load(&paths::config_file())
  }

  /// Reads `path`; a missing file yields the defaults.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = match std::fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
      }
      Err(source) => {
        return Err(ConfigError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };
    let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.base_dir = path.parent().map(Path::to_path_buf);
    Ok(config)
  }

  /// Compilers in preference order; the system compiler if none are listed.
  pub fn compilers(&self) -> Vec<Compiler> {
    if self.compilers.is_empty() {
      return vec![Compiler::system()];
    }
    self
      .compilers
      .iter()
      .map(|c| Compiler {
        name: c.name.clone(),
        version: c.version.clone(),
      })
      .collect()
  }

  /// Repository roots, in lookup order. `~/` expands to the home directory.
  pub fn repo_paths(&self) -> Vec<PathBuf> {
    if self.repos.paths.is_empty() {
      return vec![paths::root_dir().join("repos").join("builtin")];
    }
    self.repos.paths.iter().map(|p| self.resolve_path(p)).collect()
  }

  fn resolve_path(&self, path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
      return paths::home_dir().join(rest);
    }
    match &self.base_dir {
      Some(base) if path.is_relative() => base.join(path),
      _ => path.to_path_buf(),
    }
  }

  pub fn solve_options(&self) -> SolveOptions {
    SolveOptions {
      compilers: self.compilers(),
      target: self.solver.target.clone(),
      reuse: self.solver.reuse,
      installed: Vec::new(),
    }
  }

  pub fn build_options(&self) -> BuildOptions {
    let defaults = BuildOptions::default();
    BuildOptions {
      jobs: self.build.jobs.unwrap_or(defaults.jobs),
      io_retries: self.build.io_retries,
      retry_backoff: Duration::from_millis(self.build.retry_backoff_ms),
      keep_stage: self.build.keep_stage,
      generations: defaults.generations,
    }
  }
}
