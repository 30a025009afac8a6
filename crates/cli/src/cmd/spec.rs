//! `spackle spec`: concretize without building.

use std::path::Path;

use anyhow::{Context, Result};

use spackle_lib::graph::lockfile::Lockfile;
use spackle_lib::solve::solve;

use super::{load_config, load_repos, parse_specs};
use crate::output::{print_json, print_success};

pub fn cmd_spec(words: &[String], json: bool, lock: Option<&Path>) -> Result<()> {
  let config = load_config()?;
  let repos = load_repos(&config)?;
  let specs = parse_specs(words)?;

  let graph = solve(&specs, &repos, &config.solve_options()).context("Failed to concretize")?;
  let lockfile = Lockfile::from_graph(&graph);

  if json {
    print_json(&lockfile)?;
  } else {
    print!("{}", graph.render_tree());
  }

  if let Some(path) = lock {
    lockfile
      .save(path)
      .with_context(|| format!("Failed to write lockfile {}", path.display()))?;
    if !json {
      print_success(&format!("Wrote {}", path.display()));
    }
  }

  Ok(())
}
