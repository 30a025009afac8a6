//! `spackle find`: list the install database.

use anyhow::{Context, Result};
use serde::Serialize;

use spackle_lib::db::{InstallDatabase, InstallRecord};
use spackle_lib::spec::AbstractSpec;
use spackle_lib::root_lock::RootLock;

use crate::output::{OutputFormat, format_age, format_timestamp, print_info, print_json, print_warning};

#[derive(Serialize)]
struct FoundInstall<'a> {
  name: &'a str,
  version: String,
  hash: &'a str,
  spec: String,
  prefix: String,
  explicit: bool,
  generation: u32,
  installed_at: String,
}

impl<'a> From<&'a InstallRecord> for FoundInstall<'a> {
  fn from(record: &'a InstallRecord) -> Self {
    FoundInstall {
      name: record.spec.name(),
      version: record.spec.version().to_string(),
      hash: record.spec.hash().as_ref(),
      spec: record.spec.to_string(),
      prefix: record.prefix.display().to_string(),
      explicit: record.explicit,
      generation: record.generation,
      installed_at: format_timestamp(record.installed_at_unix),
    }
  }
}

pub fn cmd_find(query: Option<&str>, long: bool, output: OutputFormat) -> Result<()> {
  let query = query
    .map(AbstractSpec::parse)
    .transpose()
    .context("Invalid query spec")?;

  let _lock = RootLock::for_query_default().context("Failed to lock the spackle root")?;
  let db = InstallDatabase::load_default().context("Failed to load install database")?;

  let records = match &query {
    Some(query) => db.query(query),
    None => db.records(),
  };

  if output.is_json() {
    let found: Vec<FoundInstall> = records.iter().map(|r| FoundInstall::from(*r)).collect();
    return print_json(&found);
  }

  if records.is_empty() {
    print_info("No packages installed");
    return Ok(());
  }

  println!("{} installed package(s)", records.len());
  for record in &records {
    let marker = if record.explicit { "" } else { " (dependency)" };
    if long {
      println!(
        "{}  {}{}  [gen {}, {}]",
        record.spec.short_hash(),
        record.spec,
        marker,
        record.generation,
        format_age(record.installed_at_unix)
      );
      println!("         {}", record.prefix.display());
    } else {
      println!("{}@{}{}", record.spec.name(), record.spec.version(), marker);
    }
  }

  for missing in db.missing_prefixes() {
    print_warning(&format!(
      "{}-{} is recorded but its prefix {} is missing",
      missing.spec.name(),
      missing.spec.short_hash(),
      missing.prefix.display()
    ));
  }

  Ok(())
}
