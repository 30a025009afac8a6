//! Moving artifacts into install prefixes, with bounded retries.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::build::types::BuildFailure;
use crate::consts::{ARTIFACT_MARKER, BUILD_LOG, INSTALL_MARKER};
use crate::spec::ConcreteSpec;
use crate::store::{Artifact, StoreError, copy_tree};
use crate::util::hash::{ContentHash, SpecHash};

/// Metadata directory inside every install prefix.
pub const METADATA_DIR: &str = ".spackle";

/// Written last into a prefix; its presence means staging completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallMarker {
  pub hash: SpecHash,
  pub output_hash: ContentHash,
}

pub fn read_install_marker(prefix: &Path) -> Option<InstallMarker> {
  let content = fs::read_to_string(prefix.join(INSTALL_MARKER)).ok()?;
  serde_json::from_str(&content).ok()
}

/// Copies `artifact` into `prefix`, along with the spec and build log.
///
/// A prefix whose marker already names this artifact is left alone.
/// Returns the log location inside the prefix, if a log was given.
pub(crate) fn stage(
  artifact: &Artifact,
  spec: &ConcreteSpec,
  prefix: &Path,
  log: Option<&Path>,
) -> Result<Option<PathBuf>, StoreError> {
  let installed_log = log.map(|_| prefix.join(METADATA_DIR).join(BUILD_LOG));
  if let Some(marker) = read_install_marker(prefix)
    && marker.hash == artifact.hash
    && marker.output_hash == artifact.output_hash
  {
    debug!(prefix = %prefix.display(), "prefix already staged");
    return Ok(installed_log.filter(|p| p.exists()));
  }

  let parent = prefix.parent().unwrap_or(prefix);
  fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
    path: parent.to_path_buf(),
    source,
  })?;
  let staging = tempfile::Builder::new()
    .prefix(&format!(".{}-", spec.name()))
    .tempdir_in(parent)
    .map_err(|source| StoreError::CreateDir {
      path: parent.to_path_buf(),
      source,
    })?;

  copy_tree(&artifact.path, staging.path(), &[ARTIFACT_MARKER]).map_err(|source| StoreError::Copy {
    from: artifact.path.clone(),
    to: staging.path().to_path_buf(),
    source,
  })?;

  let metadata = staging.path().join(METADATA_DIR);
  fs::create_dir_all(&metadata).map_err(|source| StoreError::CreateDir {
    path: metadata.clone(),
    source,
  })?;
  let spec_json = serde_json::to_string_pretty(spec).map_err(StoreError::Serialize)?;
  fs::write(metadata.join("spec.json"), spec_json).map_err(StoreError::WriteMarker)?;
  if let Some(log) = log
    && log.exists()
  {
    fs::copy(log, metadata.join(BUILD_LOG)).map_err(|source| StoreError::Copy {
      from: log.to_path_buf(),
      to: metadata.join(BUILD_LOG),
      source,
    })?;
  }

  let marker = InstallMarker {
    hash: artifact.hash.clone(),
    output_hash: artifact.output_hash.clone(),
  };
  let content = serde_json::to_string_pretty(&marker).map_err(StoreError::Serialize)?;
  fs::write(staging.path().join(INSTALL_MARKER), content).map_err(StoreError::WriteMarker)?;

  if prefix.exists() {
    fs::remove_dir_all(prefix).map_err(|source| StoreError::Remove {
      path: prefix.to_path_buf(),
      source,
    })?;
  }
  let staged = staging.keep();
  if let Err(e) = fs::rename(&staged, prefix) {
    let _ = fs::remove_dir_all(&staged);
    return Err(StoreError::Rename(e));
  }
  Ok(installed_log)
}

/// Runs blocking `op` until it succeeds, gives up after `retries` extra
/// attempts, or hits an error that retrying cannot fix.
pub(crate) async fn with_retries<T, F>(what: &str, retries: u32, backoff: Duration, op: F) -> Result<T, BuildFailure>
where
  T: Send + 'static,
  F: Fn() -> Result<T, StoreError> + Send + Sync + 'static,
{
  let op = Arc::new(op);
  let mut delay = backoff;
  let mut attempt = 0;
  loop {
    attempt += 1;
    let call = op.clone();
    let err = match tokio::task::spawn_blocking(move || call()).await {
      Ok(Ok(value)) => return Ok(value),
      Ok(Err(e)) => e,
      Err(e) => {
        return Err(BuildFailure::Direct {
          message: format!("{} panicked: {}", what, e),
        });
      }
    };

    if !err.is_transient() {
      return Err(BuildFailure::Direct {
        message: format!("{}: {}", what, err),
      });
    }
    if attempt > retries {
      return Err(BuildFailure::Io {
        attempts: attempt,
        message: format!("{}: {}", what, err),
      });
    }
    warn!(what = %what, attempt, error = %err, "transient I/O failure, retrying");
    tokio::time::sleep(delay).await;
    delay = delay.saturating_mul(2);
  }
}
