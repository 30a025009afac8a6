//! `spackle checkout`: move a git working tree to another ref.

use anyhow::{Context, Result};

use spackle_lib::checkout::{CheckoutError, CheckoutRequest, CheckoutTarget, Git, checkout, resolve_work_dir};
use spackle_lib::env::EnvironmentStore;
use spackle_lib::repo::RepoPath;

use super::{load_config, load_repos};
use crate::output::print_success;

pub struct CheckoutArgs {
  pub reference: String,
  pub remote: String,
  pub url: Option<String>,
  pub env: Option<String>,
  pub repo: Option<String>,
}

pub fn cmd_checkout(args: CheckoutArgs) -> Result<()> {
  let target = match (args.env, args.repo) {
    (Some(env), _) => CheckoutTarget::Environment(env),
    (None, Some(namespace)) => CheckoutTarget::Repo(namespace),
    (None, None) => CheckoutTarget::Source,
  };
  // Only a repository target needs the repositories loaded
  let repos = match target {
    CheckoutTarget::Repo(_) => load_repos(&load_config()?)?,
    _ => RepoPath::default(),
  };
  let work_dir = resolve_work_dir(&target, &EnvironmentStore::default_store(), &repos)?;
  let git = Git::find().ok_or(CheckoutError::GitNotFound)?;

  let request = CheckoutRequest {
    remote: args.remote,
    url: args.url,
    reference: args.reference,
  };
  let full_ref = checkout(&git, &work_dir, &request)
    .with_context(|| format!("Failed to check out '{}' in {}", request.reference, work_dir.display()))?;

  print_success(&format!("Checked out {} in {}", full_ref, work_dir.display()));
  Ok(())
}
