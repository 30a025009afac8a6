//! Content-addressed artifact cache.
//!
//! # Layout
//!
//! ```text
//! <cache>/
//! └── <spec hash>/
//!     ├── .spackle-artifact   # marker: {version, hash, output_hash}
//!     └── ...                 # install tree of the spec
//! ```
//!
//! Entries are write-once. A reader trusts an entry only if its marker
//! parses, names the right spec hash, and records the output hash that the
//! directory hashes to right now. Anything else is a [`CacheIntegrityError`],
//! which callers treat as a miss.

mod copy;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub(crate) use copy::copy_tree;

use crate::consts::{ARTIFACT_MARKER, BUILD_LOG, INSTALL_MARKER};
use crate::util::hash::{ContentHash, DirHashError, SpecHash, hash_directory};

/// Marker format version.
const MARKER_VERSION: u32 = 1;

/// Names that never count towards an artifact's contents.
const HASH_EXCLUSIONS: &[&str] = &[ARTIFACT_MARKER, INSTALL_MARKER];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMarker {
  pub version: u32,
  pub hash: SpecHash,
  pub output_hash: ContentHash,
}

/// A verified cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub hash: SpecHash,
  pub path: PathBuf,
  pub output_hash: ContentHash,
}

#[derive(Debug, Error)]
pub enum CacheIntegrityError {
  #[error("artifact {hash} has no marker")]
  MissingMarker { hash: SpecHash },

  #[error("artifact {hash} has an unreadable marker: {message}")]
  BadMarker { hash: SpecHash, message: String },

  #[error("artifact {hash} carries a marker for {recorded}")]
  WrongHash { hash: SpecHash, recorded: SpecHash },

  #[error("artifact {hash} contents changed: expected {expected}, found {actual}")]
  ContentMismatch {
    hash: SpecHash,
    expected: ContentHash,
    actual: ContentHash,
  },

  #[error("failed to hash artifact {hash}: {source}")]
  Unhashable {
    hash: SpecHash,
    #[source]
    source: DirHashError,
  },
}

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to create {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to copy {from} to {to}: {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write artifact marker: {0}")]
  WriteMarker(#[source] io::Error),

  #[error("failed to serialize artifact marker: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to move artifact into place: {0}")]
  Rename(#[source] io::Error),

  #[error("failed to remove {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to hash {path}: {source}")]
  Hash {
    path: PathBuf,
    #[source]
    source: DirHashError,
  },

  #[error("nothing to store: {0} does not exist")]
  MissingSource(PathBuf),
}

impl StoreError {
  /// I/O failures may go away on retry; a missing source will not.
  pub fn is_transient(&self) -> bool {
    !matches!(self, StoreError::MissingSource(_) | StoreError::Serialize(_))
  }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
  root: PathBuf,
}

impl ArtifactStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    ArtifactStore { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn path(&self, hash: &SpecHash) -> PathBuf {
    self.root.join(&hash.0)
  }

  /// Returns the artifact for `hash` if a trustworthy one exists.
  ///
  /// Integrity problems are logged and reported as a miss.
  pub fn lookup(&self, hash: &SpecHash) -> Option<Artifact> {
    match self.verify(hash) {
      Ok(found) => found,
      Err(e) => {
        warn!(hash = %hash, error = %e, "ignoring corrupt cache entry");
        None
      }
    }
  }

  /// Like [`lookup`](Self::lookup) but surfaces integrity errors.
  /// `Ok(None)` means there is no entry at all.
  pub fn verify(&self, hash: &SpecHash) -> Result<Option<Artifact>, CacheIntegrityError> {
    let path = self.path(hash);
    if !path.is_dir() {
      return Ok(None);
    }

    let marker_path = path.join(ARTIFACT_MARKER);
    let content = match fs::read_to_string(&marker_path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Err(CacheIntegrityError::MissingMarker { hash: hash.clone() });
      }
      Err(e) => {
        return Err(CacheIntegrityError::BadMarker {
          hash: hash.clone(),
          message: e.to_string(),
        });
      }
    };
    let marker: ArtifactMarker = serde_json::from_str(&content).map_err(|e| CacheIntegrityError::BadMarker {
      hash: hash.clone(),
      message: e.to_string(),
    })?;
    if marker.version != MARKER_VERSION {
      return Err(CacheIntegrityError::BadMarker {
        hash: hash.clone(),
        message: format!("unsupported marker version {}", marker.version),
      });
    }
    if &marker.hash != hash {
      return Err(CacheIntegrityError::WrongHash {
        hash: hash.clone(),
        recorded: marker.hash,
      });
    }

    let actual = hash_directory(&path, HASH_EXCLUSIONS).map_err(|source| CacheIntegrityError::Unhashable {
      hash: hash.clone(),
      source,
    })?;
    if actual != marker.output_hash {
      return Err(CacheIntegrityError::ContentMismatch {
        hash: hash.clone(),
        expected: marker.output_hash,
        actual,
      });
    }

    debug!(hash = %hash, "cache hit");
    Ok(Some(Artifact {
      hash: hash.clone(),
      path,
      output_hash: actual,
    }))
  }

  /// Stores the contents of `source` under `hash`.
  ///
  /// A valid existing entry makes this a no-op, as does losing the race to
  /// another writer. A corrupt entry is replaced.
  pub fn store(&self, hash: &SpecHash, source: &Path) -> Result<Artifact, StoreError> {
    if let Some(existing) = self.lookup(hash) {
      debug!(hash = %hash, "artifact already stored");
      return Ok(existing);
    }
    if !source.is_dir() {
      return Err(StoreError::MissingSource(source.to_path_buf()));
    }

    fs::create_dir_all(&self.root).map_err(|e| StoreError::CreateDir {
      path: self.root.clone(),
      source: e,
    })?;

    // Same filesystem as the final location, so the rename below is atomic
    let staging = tempfile::Builder::new()
      .prefix(&format!(".{}-", hash.short()))
      .tempdir_in(&self.root)
      .map_err(|e| StoreError::CreateDir {
        path: self.root.clone(),
        source: e,
      })?;

    copy_tree(source, staging.path(), &[BUILD_LOG, ARTIFACT_MARKER, INSTALL_MARKER]).map_err(|e| StoreError::Copy {
      from: source.to_path_buf(),
      to: staging.path().to_path_buf(),
      source: e,
    })?;

    let output_hash = hash_directory(staging.path(), HASH_EXCLUSIONS).map_err(|e| StoreError::Hash {
      path: staging.path().to_path_buf(),
      source: e,
    })?;
    let marker = ArtifactMarker {
      version: MARKER_VERSION,
      hash: hash.clone(),
      output_hash: output_hash.clone(),
    };
    let content = serde_json::to_string_pretty(&marker).map_err(StoreError::Serialize)?;
    fs::write(staging.path().join(ARTIFACT_MARKER), content).map_err(StoreError::WriteMarker)?;

    let final_path = self.path(hash);
    if final_path.exists() {
      // Corrupt leftovers; lookup above already rejected them
      fs::remove_dir_all(&final_path).map_err(|e| StoreError::Remove {
        path: final_path.clone(),
        source: e,
      })?;
    }

    let staged = staging.keep();
    if let Err(e) = fs::rename(&staged, &final_path) {
      let _ = fs::remove_dir_all(&staged);
      if let Some(winner) = self.lookup(hash) {
        debug!(hash = %hash, "another writer stored this artifact first");
        return Ok(winner);
      }
      return Err(StoreError::Rename(e));
    }

    info!(hash = %hash, "stored artifact");
    Ok(Artifact {
      hash: hash.clone(),
      path: final_path,
      output_hash,
    })
  }

  /// Hashes of every entry that currently verifies.
  pub fn list(&self) -> Vec<SpecHash> {
    let Ok(entries) = fs::read_dir(&self.root) else {
      return Vec::new();
    };
    let mut hashes: Vec<SpecHash> = entries
      .filter_map(Result::ok)
      .filter_map(|e| e.file_name().to_str().map(|n| SpecHash(n.to_string())))
      .filter(|h| h.is_well_formed() && self.lookup(h).is_some())
      .collect();
    hashes.sort();
    hashes
  }
}
