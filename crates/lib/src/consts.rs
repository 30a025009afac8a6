//! Crate-wide constants.

/// Application name used for directory layout (`~/.local/share/spackle`, ...).
pub const APP_NAME: &str = "spackle";

/// Number of hex characters kept from a SHA-256 digest for spec hashes.
pub const SPEC_HASH_LEN: usize = 32;

/// Number of hex characters shown when a spec hash is abbreviated.
pub const SHORT_HASH_LEN: usize = 7;

/// Marker written into a cached artifact once it is complete.
pub const ARTIFACT_MARKER: &str = ".spackle-artifact";

/// Marker written into an install prefix once staging completed.
pub const INSTALL_MARKER: &str = ".spackle-install";

/// Name of the per-build log file (scratch dir and install prefix).
pub const BUILD_LOG: &str = "build.log";

/// Recipe file name inside `<repo>/packages/<name>/`.
pub const PACKAGE_FILE: &str = "package.json";

/// Repository descriptor file at the root of a package repository.
pub const REPO_FILE: &str = "repo.json";

/// Environment descriptor file inside an environment directory.
pub const ENV_FILE: &str = "spackle.json";
