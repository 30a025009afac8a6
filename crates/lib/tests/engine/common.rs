//! Shared helpers: in-memory repositories and a counting worker.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use serde_json::{Value, json};

use spackle_lib::build::{BuildJob, BuildWorker, WorkerError};
use spackle_lib::repo::{PackageDefinition, RepoPath, Repository};
use spackle_lib::solve::SolveOptions;
use spackle_lib::spec::{AbstractSpec, Compiler, Version};

pub const SUM: &str = "9a93b2b7dfdac77ceba5a558a580e74667dd6fede4585b91eefb60f03b72df23";

pub fn recipe(name: &str, versions: &[&str]) -> Value {
  json!({
    "name": name,
    "versions": versions.iter().map(|v| json!({ "version": v, "sha256": SUM })).collect::<Vec<_>>(),
  })
}

/// `recipe` plus dependency spec strings.
pub fn depends(name: &str, versions: &[&str], deps: &[&str]) -> Value {
  let mut r = recipe(name, versions);
  r["dependencies"] = deps.iter().map(|d| json!({ "spec": d })).collect();
  r
}

pub fn repo(recipes: Vec<Value>) -> RepoPath {
  let defs = recipes
    .into_iter()
    .map(|r| serde_json::from_value::<PackageDefinition>(r).unwrap());
  let repo = Repository::from_definitions("builtin", Path::new("/nonexistent"), defs).unwrap();
  RepoPath::new(vec![repo]).unwrap()
}

pub fn options() -> SolveOptions {
  SolveOptions {
    compilers: vec![Compiler {
      name: "gcc".into(),
      version: Version::parse("12.2.0").unwrap(),
    }],
    target: Some("x86_64-linux".into()),
    ..Default::default()
  }
}

pub fn specs(input: &str) -> Vec<AbstractSpec> {
  AbstractSpec::parse_many(input).unwrap()
}

/// Writes a file named after the package and counts calls per package.
/// Packages listed in `failing` fail instead.
#[derive(Default)]
pub struct CountingWorker {
  pub calls: Mutex<BTreeMap<String, usize>>,
  pub failing: Vec<String>,
}

impl CountingWorker {
  pub fn failing(names: &[&str]) -> Self {
    CountingWorker {
      calls: Mutex::default(),
      failing: names.iter().map(|n| n.to_string()).collect(),
    }
  }

  pub fn calls(&self, name: &str) -> usize {
    self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
  }

  pub fn total(&self) -> usize {
    self.calls.lock().unwrap().values().sum()
  }
}

impl BuildWorker for CountingWorker {
  async fn build(&self, job: &BuildJob) -> Result<(), WorkerError> {
    let name = job.spec.name().to_string();
    *self.calls.lock().unwrap().entry(name.clone()).or_default() += 1;
    if self.failing.contains(&name) {
      return Err(WorkerError::Other(format!("{} refused to build", name)));
    }
    for dep in &job.dependencies {
      assert!(dep.prefix.is_dir(), "{} built before its dependency {}", name, dep.name);
    }
    std::fs::create_dir_all(job.output.join("lib"))?;
    std::fs::write(job.output.join("lib").join(format!("lib{}.a", name)), job.spec.to_string())?;
    Ok(())
  }
}
