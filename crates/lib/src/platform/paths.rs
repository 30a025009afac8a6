//! Directory layout.
//!
//! Every location can be redirected through an environment variable so tests
//! and CI runs get an isolated tree:
//!
//! - `SPACKLE_ROOT`: install tree, stage, downloads, database and environments
//! - `SPACKLE_CACHE`: content-addressed artifact cache
//! - `SPACKLE_CONFIG`: configuration file
//! - `SPACKLE_SOURCE`: the tool's own source checkout (for `spackle checkout`)

use crate::consts::APP_NAME;
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("C:\\"))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("/"))
}

/// Returns the directory for configuration files for the application
#[cfg(windows)]
pub fn config_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Roaming"))
    .join(APP_NAME)
}

/// Returns the directory for configuration files for the application
#[cfg(not(windows))]
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Roaming"))
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the directory for cache files for the application
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Local"))
    .join(APP_NAME)
    .join("Cache")
}

/// Returns the directory for cache files for the application
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Root of everything spackle owns besides the cache.
pub fn root_dir() -> PathBuf {
  if let Ok(path) = std::env::var("SPACKLE_ROOT") {
    return PathBuf::from(path);
  }
  data_dir()
}

/// Install tree: one prefix per concrete spec.
pub fn install_dir() -> PathBuf {
  root_dir().join("opt")
}

/// Scratch space for in-progress builds.
pub fn stage_dir() -> PathBuf {
  root_dir().join("stage")
}

/// Install database directory.
pub fn db_dir() -> PathBuf {
  root_dir().join("db")
}

/// Verified source downloads, shared by all builds.
pub fn download_dir() -> PathBuf {
  root_dir().join("downloads")
}

/// Named environments live here, one directory each.
pub fn environments_dir() -> PathBuf {
  root_dir().join("environments")
}

/// Content-addressed artifact cache.
pub fn artifact_cache_dir() -> PathBuf {
  if let Ok(path) = std::env::var("SPACKLE_CACHE") {
    return PathBuf::from(path);
  }
  cache_dir().join("artifacts")
}

/// Configuration file location.
pub fn config_file() -> PathBuf {
  if let Ok(path) = std::env::var("SPACKLE_CONFIG") {
    return PathBuf::from(path);
  }
  config_dir().join("config.toml")
}

/// The tool's own source checkout.
///
/// Defaults to the directory above the running executable's `bin/`, which is
/// where a source install places it.
pub fn source_dir() -> Option<PathBuf> {
  if let Ok(path) = std::env::var("SPACKLE_SOURCE") {
    return Some(PathBuf::from(path));
  }
  let exe = std::env::current_exe().ok()?;
  exe.parent()?.parent().map(PathBuf::from)
}
