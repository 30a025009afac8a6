//! Switching a git working tree to another ref.
//!
//! The tree can be spackle's own source checkout, an environment directory or
//! a package repository. Branches are always fetched so they track their
//! remote; commits and tags already present locally are checked out as-is.

mod git;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

pub use git::{Git, GitOutput, GitRunner};

use crate::env::{EnvError, EnvironmentStore};
use crate::platform::paths::source_dir;
use crate::repo::RepoPath;

pub const DEFAULT_REMOTE: &str = "origin";

#[derive(Debug, Error)]
pub enum CheckoutError {
  #[error("git executable not found on PATH")]
  GitNotFound,

  #[error("cannot locate the spackle source directory")]
  NoSourceDir,

  #[error(transparent)]
  Environment(#[from] EnvError),

  #[error("'{0}' is not a valid spackle repo namespace")]
  UnknownRepo(String),

  #[error(
    "git url {actual} does not match given url {given} for remote '{remote}'. \
     Either use the git url or specify a new remote name for the new url."
  )]
  RemoteUrlMismatch {
    remote: String,
    actual: String,
    given: String,
  },

  #[error("a url is required to checkout from unknown remote {0}")]
  UnknownRemote(String),

  #[error("git {command} failed ({code:?}): {stderr}")]
  Git {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("failed to run git: {0}")]
  Spawn(#[from] io::Error),
}

/// Which working tree to operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutTarget {
  Source,
  Environment(String),
  Repo(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
  pub remote: String,
  /// Used to add `remote` if it does not exist yet.
  pub url: Option<String>,
  pub reference: String,
}

impl CheckoutRequest {
  pub fn new(reference: impl Into<String>) -> Self {
    CheckoutRequest {
      remote: DEFAULT_REMOTE.to_string(),
      url: None,
      reference: reference.into(),
    }
  }
}

/// Directory a checkout of `target` operates in.
pub fn resolve_work_dir(
  target: &CheckoutTarget,
  envs: &EnvironmentStore,
  repos: &RepoPath,
) -> Result<PathBuf, CheckoutError> {
  match target {
    CheckoutTarget::Source => source_dir().ok_or(CheckoutError::NoSourceDir),
    CheckoutTarget::Environment(name) => Ok(envs.resolve(name)?),
    CheckoutTarget::Repo(namespace) => repos
      .by_namespace(namespace)
      .map(|repo| repo.root().to_path_buf())
      .ok_or_else(|| CheckoutError::UnknownRepo(namespace.clone())),
  }
}

/// Checks out `request.reference` in `work_dir`, fetching first when needed.
///
/// Returns the ref actually passed to `git checkout`.
pub fn checkout(git: &dyn GitRunner, work_dir: &Path, request: &CheckoutRequest) -> Result<String, CheckoutError> {
  let reference = request.reference.as_str();
  let is_branch = local_branches(git, work_dir)?.iter().any(|b| b == reference);

  if is_branch || !known_commit_or_tag(git, work_dir, reference)? {
    fetch_remote(git, work_dir, &request.remote, request.url.as_deref())?;
  }

  // Branches come from the remote so a stale local branch is not reused
  let full_ref = if is_branch {
    format!("{}/{}", request.remote, reference)
  } else {
    reference.to_string()
  };
  run_checked(git, work_dir, &["checkout", &full_ref])?;
  info!(dir = %work_dir.display(), reference = %full_ref, "checked out");
  Ok(full_ref)
}

fn local_branches(git: &dyn GitRunner, work_dir: &Path) -> Result<Vec<String>, CheckoutError> {
  let out = run_checked(git, work_dir, &["branch"])?;
  Ok(
    out
      .lines()
      .map(|line| line.trim_matches(|c| c == '*' || c == ' ').to_string())
      .filter(|b| !b.is_empty())
      .collect(),
  )
}

/// Tree refs are ambiguous with commits until fetched, so only commits and
/// tags count as known.
fn known_commit_or_tag(git: &dyn GitRunner, work_dir: &Path, reference: &str) -> Result<bool, CheckoutError> {
  let out = git.run(work_dir, &["cat-file", "-t", reference])?;
  Ok(out.success && matches!(out.stdout.trim(), "commit" | "tag"))
}

fn fetch_remote(git: &dyn GitRunner, work_dir: &Path, remote: &str, url: Option<&str>) -> Result<(), CheckoutError> {
  let remotes = run_checked(git, work_dir, &["remote"])?;
  if remotes.lines().any(|r| r.trim() == remote) {
    let actual = run_checked(git, work_dir, &["remote", "get-url", remote])?;
    let actual = actual.trim_end_matches('\n');
    if let Some(given) = url
      && actual != given
    {
      return Err(CheckoutError::RemoteUrlMismatch {
        remote: remote.to_string(),
        actual: actual.to_string(),
        given: given.to_string(),
      });
    }
  } else if let Some(url) = url {
    run_checked(git, work_dir, &["remote", "add", remote, url])?;
  } else {
    return Err(CheckoutError::UnknownRemote(remote.to_string()));
  }
  run_checked(git, work_dir, &["fetch", remote])?;
  Ok(())
}

fn run_checked(git: &dyn GitRunner, work_dir: &Path, args: &[&str]) -> Result<String, CheckoutError> {
  let out = git.run(work_dir, args)?;
  if !out.success {
    return Err(CheckoutError::Git {
      command: args.join(" "),
      code: out.code,
      stderr: out.stderr.trim().to_string(),
    });
  }
  Ok(out.stdout)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::cell::RefCell;
  use std::collections::BTreeMap;

  /// Answers from a script keyed by the joined argument list; anything
  /// unscripted succeeds with empty output.
  #[derive(Default)]
  struct FakeGit {
    script: BTreeMap<String, GitOutput>,
    calls: RefCell<Vec<String>>,
  }

  impl FakeGit {
    fn answer(mut self, args: &str, stdout: &str) -> Self {
      self.script.insert(
        args.to_string(),
        GitOutput {
          success: true,
          code: Some(0),
          stdout: stdout.to_string(),
          stderr: String::new(),
        },
      );
      self
    }

    fn fail(mut self, args: &str) -> Self {
      self.script.insert(
        args.to_string(),
        GitOutput {
          success: false,
          code: Some(128),
          stdout: String::new(),
          stderr: "fatal: Not a valid object name".to_string(),
        },
      );
      self
    }

    fn calls(&self) -> Vec<String> {
      self.calls.borrow().clone()
    }
  }

  impl GitRunner for FakeGit {
    fn run(&self, _work_dir: &Path, args: &[&str]) -> io::Result<GitOutput> {
      let key = args.join(" ");
      self.calls.borrow_mut().push(key.clone());
      Ok(self.script.get(&key).cloned().unwrap_or(GitOutput {
        success: true,
        code: Some(0),
        ..Default::default()
      }))
    }
  }

  fn request(reference: &str, url: Option<&str>) -> CheckoutRequest {
    CheckoutRequest {
      url: url.map(str::to_string),
      ..CheckoutRequest::new(reference)
    }
  }

  #[test]
  fn branch_is_fetched_and_taken_from_remote() {
    let git = FakeGit::default()
      .answer("branch", "* develop\n  releases/v1\n")
      .answer("remote", "origin\n")
      .answer("remote get-url origin", "https://example.org/spackle.git\n");

    let full = checkout(&git, Path::new("/src"), &request("develop", None)).unwrap();

    assert_eq!(full, "origin/develop");
    assert_eq!(
      git.calls(),
      vec![
        "branch",
        "remote",
        "remote get-url origin",
        "fetch origin",
        "checkout origin/develop"
      ]
    );
  }

  #[test]
  fn known_tag_is_checked_out_without_fetching() {
    let git = FakeGit::default()
      .answer("branch", "* develop\n")
      .answer("cat-file -t v1.0", "tag\n");

    let full = checkout(&git, Path::new("/src"), &request("v1.0", None)).unwrap();

    assert_eq!(full, "v1.0");
    assert_eq!(git.calls(), vec!["branch", "cat-file -t v1.0", "checkout v1.0"]);
  }

  #[test]
  fn unknown_ref_fetches_then_checks_out_directly() {
    let git = FakeGit::default()
      .answer("branch", "* develop\n")
      .fail("cat-file -t 1a2b3c")
      .answer("remote", "origin\n")
      .answer("remote get-url origin", "https://example.org/spackle.git");

    let full = checkout(&git, Path::new("/src"), &request("1a2b3c", None)).unwrap();

    assert_eq!(full, "1a2b3c");
    assert!(git.calls().contains(&"fetch origin".to_string()));
  }

  #[test]
  fn tree_objects_are_not_trusted() {
    let git = FakeGit::default()
      .answer("branch", "")
      .answer("cat-file -t abc", "tree\n")
      .answer("remote", "origin\n");

    checkout(&git, Path::new("/src"), &request("abc", None)).unwrap();
    assert!(git.calls().contains(&"fetch origin".to_string()));
  }

  #[test]
  fn mismatched_url_is_an_error() {
    let git = FakeGit::default()
      .answer("branch", "* develop\n")
      .answer("remote", "origin\n")
      .answer("remote get-url origin", "https://example.org/spackle.git\n");

    let err = checkout(
      &git,
      Path::new("/src"),
      &request("develop", Some("https://mirror.example.org/spackle.git")),
    )
    .unwrap_err();

    assert!(matches!(err, CheckoutError::RemoteUrlMismatch { .. }));
    assert!(!git.calls().iter().any(|c| c.starts_with("checkout")));
  }

  #[test]
  fn unknown_remote_needs_a_url() {
    let git = FakeGit::default().answer("branch", "").answer("remote", "origin\n");
    let req = CheckoutRequest {
      remote: "fork".to_string(),
      ..request("feature", None)
    };

    let err = checkout(&git, Path::new("/src"), &req).unwrap_err();
    assert!(matches!(err, CheckoutError::UnknownRemote(ref r) if r == "fork"));
  }

  #[test]
  fn unknown_remote_is_added_when_url_given() {
    let git = FakeGit::default().answer("branch", "").answer("remote", "origin\n");
    let req = CheckoutRequest {
      remote: "fork".to_string(),
      ..request("feature", Some("https://example.org/fork.git"))
    };

    checkout(&git, Path::new("/src"), &req).unwrap();
    let calls = git.calls();
    assert!(calls.contains(&"remote add fork https://example.org/fork.git".to_string()));
    assert!(calls.contains(&"fetch fork".to_string()));
    assert_eq!(calls.last().map(String::as_str), Some("checkout feature"));
  }

  #[test]
  fn failing_checkout_reports_git_error() {
    let git = FakeGit::default()
      .answer("branch", "")
      .answer("cat-file -t v2", "tag")
      .fail("checkout v2");

    let err = checkout(&git, Path::new("/src"), &request("v2", None)).unwrap_err();
    assert!(matches!(err, CheckoutError::Git { ref command, .. } if command == "checkout v2"));
  }

  #[test]
  fn work_dir_for_repo_namespace() {
    let repos = crate::util::testutil::memory_repo(vec![]);
    let envs = EnvironmentStore::new("/nonexistent/envs");

    let dir = resolve_work_dir(&CheckoutTarget::Repo("builtin".to_string()), &envs, &repos).unwrap();
    assert_eq!(dir, PathBuf::from("/nonexistent"));

    let err = resolve_work_dir(&CheckoutTarget::Repo("other".to_string()), &envs, &repos).unwrap_err();
    assert_eq!(err.to_string(), "'other' is not a valid spackle repo namespace");

    assert!(matches!(
      resolve_work_dir(&CheckoutTarget::Environment("dev".to_string()), &envs, &repos),
      Err(CheckoutError::Environment(EnvError::NotFound(_)))
    ));
  }
}
