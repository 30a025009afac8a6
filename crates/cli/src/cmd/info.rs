//! `spackle info`: show a recipe.

use anyhow::{Result, bail};

use spackle_lib::repo::PackageDefinition;
use spackle_lib::spec::AbstractSpec;

use super::{load_config, load_repos};
use crate::output::{OutputFormat, print_json, print_stat};

pub fn cmd_info(package: &str, output: OutputFormat) -> Result<()> {
  let config = load_config()?;
  let repos = load_repos(&config)?;

  let query = AbstractSpec::named(package);
  let def = match repos.get(&query) {
    Ok(def) => def,
    Err(_) => bail!("No package named '{}' in any repository", package),
  };

  if output.is_json() {
    return print_json(def.as_ref());
  }
  print_definition(def);
  Ok(())
}

fn print_definition(def: &PackageDefinition) {
  println!("{}.{}", def.namespace, def.name);
  if !def.description.is_empty() {
    println!("    {}", def.description);
  }
  if let Some(homepage) = &def.homepage {
    print_stat("Homepage", homepage);
  }

  println!();
  println!("Versions:");
  let preferred = def.preferred_version().map(|v| v.version.clone());
  for v in def.versions_descending() {
    let mut tags = Vec::new();
    if preferred.as_ref() == Some(&v.version) {
      tags.push("preferred");
    }
    if v.deprecated {
      tags.push("deprecated");
    }
    if tags.is_empty() {
      println!("    {}", v.version);
    } else {
      println!("    {} [{}]", v.version, tags.join(", "));
    }
  }

  if !def.variants.is_empty() {
    println!();
    println!("Variants:");
    for variant in &def.variants {
      let allowed = if variant.values.is_empty() {
        String::new()
      } else {
        format!(" ({})", variant.values.join(", "))
      };
      println!("    {} [default: {}]{}", variant.name, variant.default, allowed);
      if !variant.description.is_empty() {
        println!("        {}", variant.description);
      }
    }
  }

  if !def.dependencies.is_empty() {
    println!();
    println!("Dependencies:");
    for dep in &def.dependencies {
      let types: Vec<&str> = dep.types.iter().map(|t| t.as_str()).collect();
      match &dep.when {
        Some(when) => println!("    {} [{}] when {}", dep.spec, types.join(","), when),
        None => println!("    {} [{}]", dep.spec, types.join(",")),
      }
    }
  }

  if !def.conflicts.is_empty() {
    println!();
    println!("Conflicts:");
    for conflict in &def.conflicts {
      let when = conflict.when.as_ref().map(|w| format!(" when {}", w)).unwrap_or_default();
      match &conflict.msg {
        Some(msg) => println!("    {}{}: {}", conflict.spec, when, msg),
        None => println!("    {}{}", conflict.spec, when),
      }
    }
  }

  if !def.phases.is_empty() {
    println!();
    println!("Phases:");
    for phase in &def.phases {
      println!("    {}: {}", phase.name, phase.run);
    }
  }
}
