//! Package repositories.
//!
//! A repository is a directory with a `repo.json` naming its namespace and
//! one recipe per package:
//!
//! ```text
//! <repo>/
//! ├── repo.json                    # { "namespace": "builtin" }
//! └── packages/
//!     └── zlib/
//!         └── package.json
//! ```
//!
//! A [`RepoPath`] searches an ordered list of repositories; the first one that
//! knows a package wins.

mod definition;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use definition::{ConflictDef, DependencyDef, PackageDefinition, PhaseDef, VariantDef, VersionDef};

use crate::consts::{PACKAGE_FILE, REPO_FILE};
use crate::spec::AbstractSpec;

#[derive(Debug, Error)]
pub enum RepoError {
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

  #[error("recipe at {path} is named '{declared}' but lives in directory '{expected}'")]
  NameMismatch {
    path: PathBuf,
    declared: String,
    expected: String,
  },

  #[error("invalid recipe for '{package}': {reason}")]
  InvalidRecipe { package: String, reason: String },

  #[error("unknown package '{0}'")]
  UnknownPackage(String),

  #[error("unknown repository namespace '{0}'")]
  UnknownNamespace(String),

  #[error("repository namespace '{0}' is configured twice")]
  DuplicateNamespace(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RepoDescriptor {
  namespace: String,
}

/// One loaded repository.
#[derive(Debug, Clone)]
pub struct Repository {
  root: PathBuf,
  namespace: String,
  packages: BTreeMap<String, Arc<PackageDefinition>>,
}

impl Repository {
  /// Loads every recipe under `root/packages`.
  pub fn load(root: &Path) -> Result<Self, RepoError> {
    let descriptor_path = root.join(REPO_FILE);
    let content = fs::read_to_string(&descriptor_path).map_err(|source| RepoError::Read {
      path: descriptor_path.clone(),
      source,
    })?;
    let descriptor: RepoDescriptor = serde_json::from_str(&content).map_err(|source| RepoError::Parse {
      path: descriptor_path.clone(),
      source,
    })?;

    let packages_dir = root.join("packages");
    let mut entries = match fs::read_dir(&packages_dir) {
      Ok(entries) => entries
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| RepoError::Read {
          path: packages_dir.clone(),
          source,
        })?,
      Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
      Err(source) => {
        return Err(RepoError::Read {
          path: packages_dir,
          source,
        });
      }
    };
    entries.sort_by_key(|e| e.file_name());

    let mut definitions = Vec::new();
    for entry in entries {
      let recipe_path = entry.path().join(PACKAGE_FILE);
      if !recipe_path.is_file() {
        continue;
      }
      let dir_name = entry.file_name().to_string_lossy().into_owned();
      let content = fs::read_to_string(&recipe_path).map_err(|source| RepoError::Read {
        path: recipe_path.clone(),
        source,
      })?;
      let mut def: PackageDefinition = serde_json::from_str(&content).map_err(|source| RepoError::Parse {
        path: recipe_path.clone(),
        source,
      })?;
      if def.name != dir_name {
        return Err(RepoError::NameMismatch {
          path: recipe_path,
          declared: def.name,
          expected: dir_name,
        });
      }
      def.recipe_dir = entry.path();
      definitions.push(def);
    }

    let repo = Self::from_definitions(&descriptor.namespace, root, definitions)?;
    debug!(namespace = %repo.namespace, packages = repo.packages.len(), path = %root.display(), "loaded repository");
    Ok(repo)
  }

  /// Builds a repository from recipes already in memory.
  pub fn from_definitions(
    namespace: &str,
    root: &Path,
    definitions: impl IntoIterator<Item = PackageDefinition>,
  ) -> Result<Self, RepoError> {
    let mut packages = BTreeMap::new();
    for mut def in definitions {
      def.namespace = namespace.to_string();
      def.validate().map_err(|reason| RepoError::InvalidRecipe {
        package: def.name.clone(),
        reason,
      })?;
      packages.insert(def.name.clone(), Arc::new(def));
    }
    Ok(Repository {
      root: root.to_path_buf(),
      namespace: namespace.to_string(),
      packages,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  pub fn get(&self, name: &str) -> Option<&Arc<PackageDefinition>> {
    self.packages.get(name)
  }

  pub fn package_names(&self) -> impl Iterator<Item = &str> {
    self.packages.keys().map(String::as_str)
  }
}

/// Ordered list of repositories.
#[derive(Debug, Clone, Default)]
pub struct RepoPath {
  repos: Vec<Repository>,
}

impl RepoPath {
  pub fn new(repos: Vec<Repository>) -> Result<Self, RepoError> {
    for (i, repo) in repos.iter().enumerate() {
      if repos[..i].iter().any(|r| r.namespace == repo.namespace) {
        return Err(RepoError::DuplicateNamespace(repo.namespace.clone()));
      }
    }
    Ok(RepoPath { repos })
  }

  /// Loads each directory in order.
  pub fn load(paths: &[PathBuf]) -> Result<Self, RepoError> {
    let repos = paths.iter().map(|p| Repository::load(p)).collect::<Result<Vec<_>, _>>()?;
    Self::new(repos)
  }

  pub fn repos(&self) -> &[Repository] {
    &self.repos
  }

  /// First repository that defines `name`.
  pub fn lookup(&self, name: &str) -> Option<&Arc<PackageDefinition>> {
    self.repos.iter().find_map(|r| r.get(name))
  }

  pub fn by_namespace(&self, namespace: &str) -> Option<&Repository> {
    self.repos.iter().find(|r| r.namespace == namespace)
  }

  /// Resolves the recipe a spec refers to, honoring an explicit namespace.
  pub fn get(&self, spec: &AbstractSpec) -> Result<&Arc<PackageDefinition>, RepoError> {
    let name = spec.name().ok_or_else(|| RepoError::UnknownPackage(spec.to_string()))?;
    match spec.namespace() {
      Some(ns) => self
        .by_namespace(ns)
        .ok_or_else(|| RepoError::UnknownNamespace(ns.to_string()))?
        .get(name)
        .ok_or_else(|| RepoError::UnknownPackage(format!("{}.{}", ns, name))),
      None => self.lookup(name).ok_or_else(|| RepoError::UnknownPackage(name.to_string())),
    }
  }

  /// All package names visible through the path, each once.
  pub fn package_names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.repos.iter().flat_map(|r| r.package_names()).collect();
    names.sort_unstable();
    names.dedup();
    names
  }

  pub fn len(&self) -> usize {
    self.package_names().len()
  }

  pub fn is_empty(&self) -> bool {
    self.repos.iter().all(|r| r.packages.is_empty())
  }
}
