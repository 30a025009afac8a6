//! Hashing for spec identity and artifact verification.
//!
//! - `SpecHash`: 32-character truncated SHA-256 identifying a concrete spec
//! - `ContentHash`: full 64-character SHA-256 of file or directory contents
//! - `hash_directory()`: deterministic directory hashing used by the artifact
//!   store and install markers

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::consts::{SHORT_HASH_LEN, SPEC_HASH_LEN};

pub type HashError = serde_json::Error;

/// Identity of a concrete spec.
///
/// Lowercase hex, `SPEC_HASH_LEN` characters, e.g. `"3f2a9c0d..."`. Two
/// concrete specs with the same hash are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecHash(pub String);

impl SpecHash {
  /// Abbreviated form for display.
  pub fn short(&self) -> &str {
    let end = self.0.len().min(SHORT_HASH_LEN);
    &self.0[..end]
  }

  /// True if this looks like a spec hash (right length, lowercase hex).
  pub fn is_well_formed(&self) -> bool {
    self.0.len() == SPEC_HASH_LEN && self.0.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
  }
}

impl std::fmt::Display for SpecHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl AsRef<str> for SpecHash {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

/// Types whose canonical JSON form defines their identity.
///
/// Implementors must serialize deterministically: maps as `BTreeMap`, lists
/// in a stable order.
pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<SpecHash, HashError> {
    let serialized = serde_json::to_vec(self)?;
    let digest = Sha256::digest(&serialized);
    let full = hex::encode(digest);
    Ok(SpecHash(full[..SPEC_HASH_LEN].to_string()))
  }
}

/// A full 64-character SHA-256 hash for content verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum DirHashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },

  #[error("failed to read symlink {path}: {message}")]
  ReadSymlink { path: String, message: String },
}

/// Compute a deterministic hash of a directory's contents.
///
/// File contents, directory structure and symlink targets are included;
/// timestamps and permissions are not. Entries named in `exclude` are skipped
/// at any depth, which is how markers keep out of their own hash.
pub fn hash_directory(path: &Path, exclude: &[&str]) -> Result<ContentHash, DirHashError> {
  let mut entries: Vec<(String, String)> = Vec::new();

  let walker = WalkDir::new(path).sort_by_file_name().into_iter().filter_entry(|e| {
    e.file_name()
      .to_str()
      .map(|name| !exclude.contains(&name))
      .unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(|e| DirHashError::WalkDir { message: e.to_string() })?;
    let entry_path = entry.path();

    // Forward slashes so the hash is stable across platforms
    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .components()
      .map(|c| c.as_os_str().to_string_lossy().into_owned())
      .collect::<Vec<_>>()
      .join("/");

    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let line = if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|e| DirHashError::ReadSymlink {
        path: entry_path.display().to_string(),
        message: e.to_string(),
      })?;
      format!("L:{}:{}", rel_path, hash_bytes(target.to_string_lossy().as_bytes()))
    } else if file_type.is_file() {
      format!("F:{}:{}", rel_path, hash_file(entry_path)?)
    } else if file_type.is_dir() {
      format!("D:{}", rel_path)
    } else {
      continue;
    };

    entries.push((rel_path, line));
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));

  let mut hasher = Sha256::new();
  for (_, line) in entries {
    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, DirHashError> {
  let read_err = |e: std::io::Error| DirHashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  };
  let mut file = fs::File::open(path).map_err(read_err)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  #[derive(Serialize)]
  struct Probe {
    name: &'static str,
    version: &'static str,
  }

  impl Hashable for Probe {}

  #[test]
  fn spec_hash_is_truncated_hex() {
    let hash = Probe { name: "zlib", version: "1.3" }.compute_hash().unwrap();
    assert_eq!(hash.0.len(), SPEC_HASH_LEN);
    assert!(hash.is_well_formed());
    assert_eq!(hash.short().len(), SHORT_HASH_LEN);
  }

  #[test]
  fn spec_hash_tracks_field_changes() {
    let a = Probe { name: "zlib", version: "1.3" }.compute_hash().unwrap();
    let b = Probe { name: "zlib", version: "1.3" }.compute_hash().unwrap();
    let c = Probe { name: "zlib", version: "1.2" }.compute_hash().unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn malformed_hashes_are_detected() {
    assert!(!SpecHash("xyz".into()).is_well_formed());
    assert!(!SpecHash("A".repeat(SPEC_HASH_LEN)).is_well_formed());
  }

  #[test]
  fn hash_empty_directory() {
    let temp = tempdir().unwrap();
    let hash = hash_directory(temp.path(), &[]).unwrap();
    assert_eq!(hash.0.len(), 64);
  }

  #[test]
  fn hash_changes_with_content() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("file.txt"), "original").unwrap();
    let hash1 = hash_directory(temp.path(), &[]).unwrap();

    fs::write(temp.path().join("file.txt"), "modified").unwrap();
    let hash2 = hash_directory(temp.path(), &[]).unwrap();

    assert_ne!(hash1, hash2);
  }

  #[test]
  fn hash_respects_exclusions() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("file.txt"), "content").unwrap();
    let hash1 = hash_directory(temp.path(), &[]).unwrap();

    fs::write(temp.path().join(".spackle-artifact"), "marker").unwrap();
    let hash2 = hash_directory(temp.path(), &[".spackle-artifact"]).unwrap();

    assert_eq!(hash1, hash2);
  }

  #[test]
  fn same_content_different_structure_different_hash() {
    let temp1 = tempdir().unwrap();
    fs::write(temp1.path().join("file.txt"), "content").unwrap();

    let temp2 = tempdir().unwrap();
    fs::create_dir(temp2.path().join("subdir")).unwrap();
    fs::write(temp2.path().join("subdir/file.txt"), "content").unwrap();

    assert_ne!(
      hash_directory(temp1.path(), &[]).unwrap(),
      hash_directory(temp2.path(), &[]).unwrap()
    );
  }

  #[cfg(unix)]
  #[test]
  fn symlink_target_is_hashed_not_followed() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("a"), "a").unwrap();
    fs::write(temp.path().join("b"), "a").unwrap();
    std::os::unix::fs::symlink("a", temp.path().join("link")).unwrap();
    let hash1 = hash_directory(temp.path(), &[]).unwrap();

    fs::remove_file(temp.path().join("link")).unwrap();
    std::os::unix::fs::symlink("b", temp.path().join("link")).unwrap();
    let hash2 = hash_directory(temp.path(), &[]).unwrap();

    assert_ne!(hash1, hash2);
  }
}
