//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Root of the fixture package repository.
pub fn fixture_repo() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join("repo")
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory with an isolated root, cache
/// and config file.
pub struct TestEnv {
  pub temp: TempDir,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// Config pointing at the fixture repository.
  pub fn new() -> Self {
    Self::with_config("")
  }

  /// Fixture-repository config followed by `extra` TOML.
  pub fn with_config(extra: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("config.toml");
    let content = format!(
      "[repos]\npaths = ['{}']\n\n[solver]\ntarget = 'x86_64-linux'\n\n[[compilers]]\nname = 'gcc'\nversion = '12.2.0'\n\n{}",
      fixture_repo().display(),
      extra
    );
    std::fs::write(&config_path, content).unwrap();
    Self { temp, config_path }
  }

  /// Spackle root (isolated per test).
  pub fn root_path(&self) -> PathBuf {
    let p = self.temp.path().join("spackle");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Artifact cache (isolated per test).
  pub fn cache_path(&self) -> PathBuf {
    let p = self.temp.path().join("cache");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }

  /// Get a pre-configured Command for the spackle binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `SPACKLE_CONFIG`: the generated config file
  /// - `SPACKLE_ROOT`: isolated install tree, database and environments
  /// - `SPACKLE_CACHE`: isolated artifact cache
  pub fn spackle_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("spackle");
    cmd.env("SPACKLE_CONFIG", &self.config_path);
    cmd.env("SPACKLE_ROOT", self.root_path());
    cmd.env("SPACKLE_CACHE", self.cache_path());
    cmd.env_remove("SPACKLE_SOURCE");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// Runs `spackle <args> --output json` and parses stdout.
  pub fn json(&self, args: &[&str]) -> serde_json::Value {
    let output = self
      .spackle_cmd()
      .args(args)
      .args(["--output", "json"])
      .output()
      .unwrap();
    assert!(
      output.status.success(),
      "spackle {:?} failed: {}",
      args,
      String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
  }
}
