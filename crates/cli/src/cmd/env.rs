//! `spackle env`: named environments.

use anyhow::{Context, Result};

use spackle_lib::env::EnvironmentStore;

use crate::output::{OutputFormat, print_info, print_json, print_success};

pub fn cmd_env_create(name: &str) -> Result<()> {
  let store = EnvironmentStore::default_store();
  let env = store
    .create(name)
    .with_context(|| format!("Failed to create environment '{}'", name))?;
  print_success(&format!("Created environment '{}' in {}", env.name, env.path.display()));
  Ok(())
}

pub fn cmd_env_list(output: OutputFormat) -> Result<()> {
  let names = EnvironmentStore::default_store().list();
  if output.is_json() {
    return print_json(&names);
  }
  if names.is_empty() {
    print_info("No environments");
  }
  for name in names {
    println!("{}", name);
  }
  Ok(())
}
