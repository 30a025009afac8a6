//! Source downloads, verified against the recipe's checksum.
//!
//! Downloads are kept in a directory shared by every build, named after the
//! checksum they were verified against, so a rebuild or another package
//! using the same tarball does not download it again.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::build::worker::WorkerError;
use crate::util::hash::hash_bytes;

/// Leading checksum characters in a cached download's name.
const CHECKSUM_PREFIX_LEN: usize = 12;

/// Returns a local copy of `url` whose SHA-256 is `sha256`, downloading it
/// into `downloads` unless a verified copy is already there.
pub async fn fetch_source(url: &str, sha256: &str, downloads: &Path) -> Result<PathBuf, WorkerError> {
  fs::create_dir_all(downloads).await?;
  let name = cached_name(url, sha256);
  let dest = downloads.join(&name);

  if fs::try_exists(&dest).await? {
    let actual = hash_bytes(&fs::read(&dest).await?).0;
    if actual.eq_ignore_ascii_case(sha256) {
      debug!(path = %dest.display(), "using cached download");
      return Ok(dest);
    }
    warn!(path = %dest.display(), expected = %sha256, actual = %actual, "cached download is corrupt, fetching again");
    fs::remove_file(&dest).await?;
  }

  info!(url = %url, "fetching source");
  let fetch_err = |e: reqwest::Error| WorkerError::Fetch {
    url: url.to_string(),
    message: e.to_string(),
  };
  let response = reqwest::get(url).await.map_err(fetch_err)?;
  if !response.status().is_success() {
    return Err(WorkerError::Fetch {
      url: url.to_string(),
      message: format!("HTTP {}", response.status()),
    });
  }
  let bytes = response.bytes().await.map_err(fetch_err)?;

  let actual = hash_bytes(&bytes).0;
  if !actual.eq_ignore_ascii_case(sha256) {
    return Err(WorkerError::ChecksumMismatch {
      url: url.to_string(),
      expected: sha256.to_string(),
      actual,
    });
  }

  // concurrent builds may fetch the same file; the rename is atomic
  let partial = downloads.join(format!("{}.part-{}", name, std::process::id()));
  let mut file = fs::File::create(&partial).await?;
  file.write_all(&bytes).await?;
  file.flush().await?;
  drop(file);
  fs::rename(&partial, &dest).await?;

  info!(path = %dest.display(), size = bytes.len(), "download verified");
  Ok(dest)
}

/// `<checksum prefix>-<last URL path segment>`, with anything unusual in the
/// segment replaced.
fn cached_name(url: &str, sha256: &str) -> String {
  let prefix = sha256.get(..CHECKSUM_PREFIX_LEN).unwrap_or(sha256);
  let segment = url
    .split(['?', '#'])
    .next()
    .and_then(|u| u.rsplit('/').next())
    .unwrap_or_default();
  let file: String = segment
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
    .collect();
  if file.is_empty() || file.chars().all(|c| c == '.') {
    return format!("{}-source", prefix);
  }
  format!("{}-{}", prefix, file)
}
