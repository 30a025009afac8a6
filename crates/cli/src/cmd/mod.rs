mod checkout;
mod env;
mod find;
mod info;
mod install;
mod spec;

pub use checkout::{CheckoutArgs, cmd_checkout};
pub use env::{cmd_env_create, cmd_env_list};
pub use find::cmd_find;
pub use info::cmd_info;
pub use install::{InstallArgs, cmd_install};
pub use spec::cmd_spec;

use anyhow::{Context, Result};

use spackle_lib::config::Config;
use spackle_lib::repo::RepoPath;
use spackle_lib::spec::AbstractSpec;

fn load_config() -> Result<Config> {
  Config::load_default().context("Failed to load config")
}

fn load_repos(config: &Config) -> Result<RepoPath> {
  let paths = config.repo_paths();
  RepoPath::load(&paths).with_context(|| {
    let shown: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    format!("Failed to load package repositories from {}", shown.join(", "))
  })
}

/// Parses command-line words as specs; `^dep` words attach to the spec before them.
fn parse_specs(words: &[String]) -> Result<Vec<AbstractSpec>> {
  let joined = words.join(" ");
  AbstractSpec::parse_many(&joined).with_context(|| format!("Invalid spec '{}'", joined))
}
