//! Test helpers shared by unit tests.

use std::fs;
use std::path::Path;

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::repo::{PackageDefinition, RepoPath, Repository};

/// A syntactically valid checksum for recipes in tests.
pub const SUM: &str = "9a93b2b7dfdac77ceba5a558a580e74667dd6fede4585b91eefb60f03b72df23";

/// A package repository in a temporary directory.
pub struct RepoFixture {
  dir: TempDir,
}

impl RepoFixture {
  pub fn new(namespace: &str) -> Self {
    let dir = TempDir::new().unwrap();
    fs::write(
      dir.path().join("repo.json"),
      serde_json::to_string(&json!({ "namespace": namespace })).unwrap(),
    )
    .unwrap();
    RepoFixture { dir }
  }

  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  /// Writes a recipe into `packages/<name>/package.json`.
  pub fn package(&self, recipe: Value) {
    let name = recipe["name"].as_str().unwrap().to_string();
    self.package_in(&name, recipe);
  }

  pub fn package_in(&self, dir: &str, recipe: Value) {
    let pkg_dir = self.dir.path().join("packages").join(dir);
    fs::create_dir_all(&pkg_dir).unwrap();
    fs::write(pkg_dir.join("package.json"), serde_json::to_string_pretty(&recipe).unwrap()).unwrap();
  }
}

/// Recipe with the given versions and nothing else.
pub fn recipe(name: &str, versions: &[&str]) -> Value {
  json!({
    "name": name,
    "versions": versions.iter().map(|v| json!({ "version": v, "sha256": SUM })).collect::<Vec<_>>(),
  })
}

/// In-memory `builtin` repository path from recipe JSON.
pub fn memory_repo(recipes: Vec<Value>) -> RepoPath {
  let defs = recipes
    .into_iter()
    .map(|r| serde_json::from_value::<PackageDefinition>(r).unwrap());
  let repo = Repository::from_definitions("builtin", Path::new("/nonexistent"), defs).unwrap();
  RepoPath::new(vec![repo]).unwrap()
}
