//! Index of installed concrete specs.
//!
//! # Storage Layout
//!
//! ```text
//! <root>/db/
//! └── index.json   # {"version": 1, "installs": [InstallRecord, ...]}
//! ```
//!
//! The index is rewritten atomically. Callers that modify it hold an
//! exclusive [`RootLock`](crate::root_lock::RootLock) on the root.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::build::read_install_marker;
use crate::platform::paths::db_dir;
use crate::spec::{AbstractSpec, ConcreteSpec};
use crate::util::hash::SpecHash;

const INDEX_FILENAME: &str = "index.json";
const DB_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
  pub spec: ConcreteSpec,
  pub prefix: PathBuf,
  /// Requested by the user rather than pulled in as a dependency.
  pub explicit: bool,
  pub generation: u32,
  pub installed_at_unix: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct DbFile {
  version: u32,
  installs: Vec<InstallRecord>,
}

#[derive(Debug, Error)]
pub enum DbError {
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

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize install database: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported install database version {0}")]
  UnsupportedVersion(u32),

  #[error("install record for {name} has a hash that does not match its contents")]
  CorruptRecord { name: String },
}

#[derive(Debug, Clone)]
pub struct InstallDatabase {
  dir: PathBuf,
  records: BTreeMap<SpecHash, InstallRecord>,
}

impl InstallDatabase {
  /// The database under the configured root.
  pub fn load_default() -> Result<Self, DbError> {
    Self::load(&db_dir())
  }

  /// Loads the index in `dir`; a missing index is an empty database.
  pub fn load(dir: &Path) -> Result<Self, DbError> {
    let path = dir.join(INDEX_FILENAME);
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Ok(InstallDatabase {
          dir: dir.to_path_buf(),
          records: BTreeMap::new(),
        });
      }
      Err(source) => return Err(DbError::Read { path, source }),
    };

    let file: DbFile = serde_json::from_str(&content).map_err(|source| DbError::Parse {
      path: path.clone(),
      source,
    })?;
    if file.version != DB_VERSION {
      return Err(DbError::UnsupportedVersion(file.version));
    }

    let mut records = BTreeMap::new();
    for record in file.installs {
      if !record.spec.verify_hash() {
        return Err(DbError::CorruptRecord {
          name: record.spec.name().to_string(),
        });
      }
      records.insert(record.spec.hash().clone(), record);
    }
    debug!(path = %path.display(), installs = records.len(), "loaded install database");
    Ok(InstallDatabase {
      dir: dir.to_path_buf(),
      records,
    })
  }

  /// Writes the index via a temporary file and rename.
  pub fn save(&self) -> Result<(), DbError> {
    fs::create_dir_all(&self.dir).map_err(|source| DbError::Write {
      path: self.dir.clone(),
      source,
    })?;
    let path = self.dir.join(INDEX_FILENAME);
    let temp_path = self.dir.join("index.json.tmp");

    let file = DbFile {
      version: DB_VERSION,
      installs: self.records.values().cloned().collect(),
    };
    let content = serde_json::to_string_pretty(&file).map_err(DbError::Serialize)?;
    fs::write(&temp_path, content).map_err(|source| DbError::Write {
      path: temp_path.clone(),
      source,
    })?;
    fs::rename(&temp_path, &path).map_err(|source| DbError::Write { path, source })?;
    Ok(())
  }

  pub fn get(&self, hash: &SpecHash) -> Option<&InstallRecord> {
    self.records.get(hash)
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// All records, ordered by name, then version, then hash.
  pub fn records(&self) -> Vec<&InstallRecord> {
    let mut out: Vec<&InstallRecord> = self.records.values().collect();
    out.sort_by(|a, b| {
      a.spec
        .name()
        .cmp(b.spec.name())
        .then_with(|| a.spec.version().cmp(b.spec.version()))
        .then_with(|| a.spec.hash().cmp(b.spec.hash()))
    });
    out
  }

  /// Installed specs, for reuse during solving.
  pub fn specs(&self) -> Vec<ConcreteSpec> {
    self.records.values().map(|r| r.spec.clone()).collect()
  }

  /// Records whose spec satisfies `query`.
  pub fn query(&self, query: &AbstractSpec) -> Vec<&InstallRecord> {
    self.records().into_iter().filter(|r| r.spec.satisfies(query)).collect()
  }

  /// Latest generation per installed hash.
  pub fn generations(&self) -> BTreeMap<SpecHash, u32> {
    self
      .records
      .iter()
      .map(|(hash, record)| (hash.clone(), record.generation))
      .collect()
  }

  /// Adds or replaces the record for `spec`. Once explicit, always explicit.
  pub fn record(&mut self, spec: ConcreteSpec, prefix: PathBuf, explicit: bool, generation: u32) {
    let explicit = explicit || self.records.get(spec.hash()).is_some_and(|r| r.explicit);
    let installed_at_unix = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs();
    self.records.insert(
      spec.hash().clone(),
      InstallRecord {
        spec,
        prefix,
        explicit,
        generation,
        installed_at_unix,
      },
    );
  }

  pub fn remove(&mut self, hash: &SpecHash) -> Option<InstallRecord> {
    self.records.remove(hash)
  }

  /// Records whose prefix no longer carries a matching install marker.
  pub fn missing_prefixes(&self) -> Vec<&InstallRecord> {
    self
      .records()
      .into_iter()
      .filter(|r| read_install_marker(&r.prefix).is_none_or(|m| &m.hash != r.spec.hash()))
      .collect()
  }
}
