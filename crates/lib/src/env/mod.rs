//! Environments: named directories holding a list of root specs.
//!
//! ```text
//! <root>/environments/
//! └── <name>/
//!     └── spackle.json   # {"specs": ["zlib@1.3", "cmake"]}
//! ```
//!
//! Any directory with a `spackle.json` also counts as an (anonymous)
//! environment when referred to by path.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::consts::ENV_FILE;
use crate::platform::paths::environments_dir;
use crate::spec::{AbstractSpec, SpecParseError};

#[derive(Debug, Error)]
pub enum EnvError {
  #[error("'{0}' is not a valid spackle environment")]
  NotFound(String),

  #[error("environment '{0}' already exists")]
  AlreadyExists(String),

  #[error("invalid environment name '{0}'")]
  InvalidName(String),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid spec in {path}: {source}")]
  Spec {
    path: PathBuf,
    #[source]
    source: SpecParseError,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Descriptor {
  #[serde(default)]
  specs: Vec<AbstractSpec>,
}

/// A loaded environment.
#[derive(Debug, Clone)]
pub struct Environment {
  pub name: String,
  pub path: PathBuf,
  pub specs: Vec<AbstractSpec>,
}

/// Maps environment names to directories.
#[derive(Debug, Clone)]
pub struct EnvironmentStore {
  root: PathBuf,
}

impl EnvironmentStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    EnvironmentStore { root: root.into() }
  }

  /// Store under the configured spackle root.
  pub fn default_store() -> Self {
    Self::new(environments_dir())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// True if a named environment exists.
  pub fn exists(&self, name: &str) -> bool {
    valid_name(name) && is_env_dir(&self.root.join(name))
  }

  /// Directory of a named environment, or of an environment given by path.
  pub fn resolve(&self, name_or_path: &str) -> Result<PathBuf, EnvError> {
    if self.exists(name_or_path) {
      return Ok(self.root.join(name_or_path));
    }
    let path = Path::new(name_or_path);
    if is_env_dir(path) {
      return Ok(dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()));
    }
    Err(EnvError::NotFound(name_or_path.to_string()))
  }

  /// Loads the environment named (or located at) `name`.
  pub fn read(&self, name: &str) -> Result<Environment, EnvError> {
    let path = self.resolve(name)?;
    let file = path.join(ENV_FILE);
    let content = fs::read_to_string(&file).map_err(|source| EnvError::Read {
      path: file.clone(),
      source,
    })?;
    let descriptor: Descriptor = serde_json::from_str(&content).map_err(|source| EnvError::Parse {
      path: file.clone(),
      source,
    })?;
    Ok(Environment {
      name: name.to_string(),
      path,
      specs: descriptor.specs,
    })
  }

  /// Creates an empty named environment.
  pub fn create(&self, name: &str) -> Result<Environment, EnvError> {
    if !valid_name(name) {
      return Err(EnvError::InvalidName(name.to_string()));
    }
    let path = self.root.join(name);
    if is_env_dir(&path) {
      return Err(EnvError::AlreadyExists(name.to_string()));
    }
    fs::create_dir_all(&path).map_err(|source| EnvError::Write {
      path: path.clone(),
      source,
    })?;
    let env = Environment {
      name: name.to_string(),
      path,
      specs: Vec::new(),
    };
    write_descriptor(&env)?;
    info!(name = %name, "created environment");
    Ok(env)
  }

  /// Appends root specs to an environment, skipping ones already listed.
  pub fn add(&self, name: &str, specs: &[AbstractSpec]) -> Result<Environment, EnvError> {
    let mut env = self.read(name)?;
    for spec in specs {
      if !env.specs.iter().any(|s| s.to_string() == spec.to_string()) {
        env.specs.push(spec.clone());
      }
    }
    write_descriptor(&env)?;
    Ok(env)
  }

  /// Names of all environments in the store, sorted.
  pub fn list(&self) -> Vec<String> {
    let Ok(entries) = fs::read_dir(&self.root) else {
      return Vec::new();
    };
    let mut names: Vec<String> = entries
      .filter_map(Result::ok)
      .filter(|e| is_env_dir(&e.path()))
      .filter_map(|e| e.file_name().to_str().map(str::to_string))
      .collect();
    names.sort();
    names
  }
}

/// True if `path` is a directory holding an environment descriptor.
pub fn is_env_dir(path: &Path) -> bool {
  path.is_dir() && path.join(ENV_FILE).is_file()
}

fn valid_name(name: &str) -> bool {
  !name.is_empty()
    && !name.starts_with('.')
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn write_descriptor(env: &Environment) -> Result<(), EnvError> {
  let file = env.path.join(ENV_FILE);
  let temp = env.path.join(format!("{}.tmp", ENV_FILE));
  let descriptor = Descriptor {
    specs: env.specs.clone(),
  };
  let content = serde_json::to_string_pretty(&descriptor).map_err(|source| EnvError::Parse {
    path: file.clone(),
    source,
  })?;
  fs::write(&temp, content).map_err(|source| EnvError::Write {
    path: temp.clone(),
    source,
  })?;
  fs::rename(&temp, &file).map_err(|source| EnvError::Write { path: file, source })
}
