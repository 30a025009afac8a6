//! Lockfiles: a concretized graph frozen to JSON.
//!
//! ```json
//! {
//!   "version": 1,
//!   "roots": ["3f2a9c0d..."],
//!   "specs": {
//!     "3f2a9c0d...": { "name": "app", "version": "1.0", ... }
//!   }
//! }
//! ```
//!
//! Loading re-verifies every hash and the graph invariants, so a hand-edited
//! lockfile cannot smuggle in a spec whose hash lies about its contents.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ConcretizationGraph, GraphError};
use crate::spec::ConcreteSpec;
use crate::util::hash::SpecHash;

/// Current lockfile format version.
pub const LOCKFILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
  pub version: u32,
  pub roots: Vec<SpecHash>,
  pub specs: BTreeMap<SpecHash, ConcreteSpec>,
}

#[derive(Debug, Error)]
pub enum LockfileError {
  #[error("failed to read lockfile: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write lockfile: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse lockfile: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize lockfile: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported lockfile version {0}, expected {LOCKFILE_VERSION}")]
  UnsupportedVersion(u32),

  #[error("lockfile key {key} holds a spec hashed {actual}")]
  KeyMismatch { key: SpecHash, actual: SpecHash },

  #[error("invalid lockfile graph: {0}")]
  Graph(#[from] GraphError),
}

impl Lockfile {
  pub fn from_graph(graph: &ConcretizationGraph) -> Self {
    Lockfile {
      version: LOCKFILE_VERSION,
      roots: graph.root_hashes().to_vec(),
      specs: graph.specs().map(|s| (s.hash().clone(), s.clone())).collect(),
    }
  }

  /// Rebuilds the graph, checking keys, hashes and structure.
  pub fn into_graph(self) -> Result<ConcretizationGraph, LockfileError> {
    if self.version != LOCKFILE_VERSION {
      return Err(LockfileError::UnsupportedVersion(self.version));
    }
    for (key, spec) in &self.specs {
      if key != spec.hash() {
        return Err(LockfileError::KeyMismatch {
          key: key.clone(),
          actual: spec.hash().clone(),
        });
      }
    }
    Ok(ConcretizationGraph::from_specs(self.roots, self.specs.into_values())?)
  }

  pub fn load(path: &Path) -> Result<Self, LockfileError> {
    let content = fs::read_to_string(path).map_err(LockfileError::Read)?;
    serde_json::from_str(&content).map_err(LockfileError::Parse)
  }

  /// Writes atomically: temp file next to the target, then rename.
  pub fn save(&self, path: &Path) -> Result<(), LockfileError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).map_err(LockfileError::Write)?;
    }
    let content = serde_json::to_string_pretty(self).map_err(LockfileError::Serialize)?;
    let temp_path = path.with_extension("lock.tmp");
    fs::write(&temp_path, content).map_err(LockfileError::Write)?;
    fs::rename(&temp_path, path).map_err(LockfileError::Write)?;
    Ok(())
  }
}
