//! Install orchestration: solve, build and database updates together.

use std::sync::Arc;

use spackle_lib::build::CancelToken;
use spackle_lib::db::InstallDatabase;
use spackle_lib::install::{ENV_LOCKFILE, InstallError, InstallRequest, InstallSettings, install};
use spackle_lib::repo::RepoPath;
use tempfile::TempDir;

use super::common::{CountingWorker, depends, options, recipe, repo, specs};

fn fixture() -> RepoPath {
  repo(vec![
    depends("app", &["1.0"], &["lib@2.0:"]),
    recipe("lib", &["1.9", "2.0", "2.1"]),
  ])
}

fn settings(root: &TempDir) -> InstallSettings {
  let mut settings = InstallSettings::under(root.path());
  settings.solve = options();
  settings.build.jobs = 2;
  settings
}

fn request(input: &str) -> InstallRequest {
  InstallRequest {
    specs: specs(input),
    environment: None,
  }
}

#[tokio::test]
async fn install_records_explicit_and_implicit_specs() {
  let root = TempDir::new().unwrap();
  let settings = settings(&root);
  let worker = Arc::new(CountingWorker::default());

  let report = install(&request("app"), &fixture(), worker, &settings, CancelToken::new())
    .await
    .unwrap();
  assert!(report.summary.is_success());

  let db = InstallDatabase::load(&root.path().join("db")).unwrap();
  assert_eq!(db.len(), 2);
  let records = db.records();
  let app = records.iter().find(|r| r.spec.name() == "app").unwrap();
  let lib = records.iter().find(|r| r.spec.name() == "lib").unwrap();
  assert!(app.explicit);
  assert!(!lib.explicit);
  assert_eq!(lib.spec.version().to_string(), "2.1");
  assert_eq!(app.generation, 1);
  assert!(app.prefix.is_dir());
}

#[tokio::test]
async fn failed_nodes_are_not_recorded() {
  let root = TempDir::new().unwrap();
  let settings = settings(&root);
  let worker = Arc::new(CountingWorker::failing(&["lib"]));

  let report = install(&request("app"), &fixture(), worker, &settings, CancelToken::new())
    .await
    .unwrap();
  assert!(!report.summary.is_success());
  assert_eq!(report.summary.propagated().len(), 1);

  let db = InstallDatabase::load(&root.path().join("db")).unwrap();
  assert!(db.is_empty());
}

#[tokio::test]
async fn reinstall_uses_cache_and_keeps_records() {
  let root = TempDir::new().unwrap();
  let settings = settings(&root);
  install(&request("app"), &fixture(), Arc::new(CountingWorker::default()), &settings, CancelToken::new())
    .await
    .unwrap();

  let worker = Arc::new(CountingWorker::default());
  let report = install(&request("app"), &fixture(), worker.clone(), &settings, CancelToken::new())
    .await
    .unwrap();
  assert_eq!(worker.total(), 0);
  assert_eq!(report.summary.cached().len(), 2);

  let db = InstallDatabase::load(&root.path().join("db")).unwrap();
  assert!(db.records().iter().all(|r| r.generation == 1));
}

#[tokio::test]
async fn reuse_prefers_installed_version() {
  let root = TempDir::new().unwrap();
  let mut settings = settings(&root);
  install(&request("lib@2.0"), &fixture(), Arc::new(CountingWorker::default()), &settings, CancelToken::new())
    .await
    .unwrap();

  settings.solve.reuse = true;
  let report = install(&request("app"), &fixture(), Arc::new(CountingWorker::default()), &settings, CancelToken::new())
    .await
    .unwrap();
  assert_eq!(report.graph.by_name("lib").unwrap().version().to_string(), "2.0");
}

#[tokio::test]
async fn environment_install_writes_lockfile() {
  let root = TempDir::new().unwrap();
  let settings = settings(&root);
  settings.environments.create("dev").unwrap();

  let request = InstallRequest {
    specs: specs("app"),
    environment: Some("dev".into()),
  };
  install(&request, &fixture(), Arc::new(CountingWorker::default()), &settings, CancelToken::new())
    .await
    .unwrap();

  let env = settings.environments.read("dev").unwrap();
  assert_eq!(env.specs.len(), 1);
  assert!(env.path.join(ENV_LOCKFILE).is_file());
}

#[tokio::test]
async fn empty_request_is_rejected() {
  let root = TempDir::new().unwrap();
  let err = install(
    &InstallRequest::default(),
    &fixture(),
    Arc::new(CountingWorker::default()),
    &settings(&root),
    CancelToken::new(),
  )
  .await
  .unwrap_err();
  assert!(matches!(err, InstallError::NothingRequested));
}
