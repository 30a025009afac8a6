//! Driving the `git` binary.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

/// Captured result of one git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
  pub success: bool,
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

/// Runs git subcommands in a working directory.
pub trait GitRunner {
  fn run(&self, work_dir: &Path, args: &[&str]) -> io::Result<GitOutput>;
}

/// Process-backed runner for a specific git executable.
#[derive(Debug, Clone)]
pub struct Git {
  program: PathBuf,
}

impl Git {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Git { program: program.into() }
  }

  /// Finds `git` on `PATH`.
  pub fn find() -> Option<Self> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
      .map(|dir| dir.join(executable_name()))
      .find(|candidate| candidate.is_file())
      .map(Git::new)
  }

  pub fn program(&self) -> &Path {
    &self.program
  }
}

#[cfg(windows)]
fn executable_name() -> &'static str {
  "git.exe"
}

#[cfg(not(windows))]
fn executable_name() -> &'static str {
  "git"
}

impl GitRunner for Git {
  fn run(&self, work_dir: &Path, args: &[&str]) -> io::Result<GitOutput> {
    debug!(dir = %work_dir.display(), args = ?args, "git");
    let output = Command::new(&self.program).args(args).current_dir(work_dir).output()?;
    Ok(GitOutput {
      success: output.status.success(),
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
  }
}
