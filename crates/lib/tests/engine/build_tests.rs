//! Scheduler behavior against a real artifact store on disk.

use std::sync::Arc;

use spackle_lib::build::{BuildFailure, BuildLayout, BuildOptions, BuildOrigin, BuildStatus, CancelToken, build};
use spackle_lib::consts::ARTIFACT_MARKER;
use spackle_lib::graph::ConcretizationGraph;
use spackle_lib::solve::solve;
use spackle_lib::store::ArtifactStore;
use tempfile::TempDir;

use super::common::{CountingWorker, depends, options, recipe, repo, specs};

fn graph(request: &str) -> Arc<ConcretizationGraph> {
  let r = repo(vec![
    depends("app", &["1.0"], &["left", "right"]),
    depends("left", &["1.0"], &["base"]),
    depends("right", &["1.0"], &["base"]),
    recipe("base", &["1.0"]),
    depends("z", &["1.0"], &["x"]),
    recipe("x", &["1.0"]),
    recipe("y", &["1.0"]),
  ]);
  Arc::new(solve(&specs(request), &r, &options()).unwrap())
}

fn build_options(jobs: usize) -> BuildOptions {
  BuildOptions {
    jobs,
    io_retries: 1,
    retry_backoff: std::time::Duration::from_millis(1),
    ..Default::default()
  }
}

#[tokio::test]
async fn diamond_builds_each_node_once() {
  let root = TempDir::new().unwrap();
  let worker = Arc::new(CountingWorker::default());
  let summary = build(
    graph("app"),
    worker.clone(),
    BuildLayout::under(root.path()),
    build_options(4),
    CancelToken::new(),
  )
  .await;

  assert!(summary.is_success());
  assert_eq!(summary.built().len(), 4);
  assert_eq!(worker.calls("base"), 1);
  assert_eq!(worker.total(), 4);
  for record in summary.records.values() {
    let prefix = record.prefix.as_ref().unwrap();
    assert!(prefix.join("lib").join(format!("lib{}.a", record.name)).is_file());
  }
}

#[tokio::test]
async fn rebuilding_the_same_graph_invokes_no_worker() {
  let root = TempDir::new().unwrap();
  let layout = BuildLayout::under(root.path());
  let g = graph("app");

  let first = Arc::new(CountingWorker::default());
  build(g.clone(), first.clone(), layout.clone(), build_options(2), CancelToken::new()).await;
  assert_eq!(first.total(), 4);

  let second = Arc::new(CountingWorker::default());
  let summary = build(g, second.clone(), layout, build_options(2), CancelToken::new()).await;
  assert_eq!(second.total(), 0);
  assert_eq!(summary.cached().len(), 4);
  assert!(summary.records.values().all(|r| r.origin == Some(BuildOrigin::Cached)));
}

#[tokio::test]
async fn failure_is_isolated_to_dependents() {
  let root = TempDir::new().unwrap();
  let worker = Arc::new(CountingWorker::failing(&["x"]));
  let g = graph("z y");
  let summary = build(
    g.clone(),
    worker.clone(),
    BuildLayout::under(root.path()),
    build_options(2),
    CancelToken::new(),
  )
  .await;

  let record = |name: &str| summary.get(g.by_name(name).unwrap().hash()).unwrap().clone();
  assert_eq!(record("y").status, BuildStatus::Built);
  assert_eq!(record("x").status, BuildStatus::Failed);
  assert!(matches!(record("x").failure, Some(BuildFailure::Direct { .. })));
  assert_eq!(
    record("z").failure,
    Some(BuildFailure::Propagated {
      from: g.by_name("x").unwrap().hash().clone()
    })
  );
  assert_eq!(worker.calls("z"), 0);
  assert!(!summary.is_success());
  assert_eq!(summary.failed().len(), 1);
  assert_eq!(summary.propagated().len(), 1);
}

#[tokio::test]
async fn corrupted_cache_entry_is_rebuilt() {
  let root = TempDir::new().unwrap();
  let layout = BuildLayout::under(root.path());
  let g = graph("base");
  let hash = g.root_hashes()[0].clone();

  build(g.clone(), Arc::new(CountingWorker::default()), layout.clone(), build_options(1), CancelToken::new()).await;

  let store = ArtifactStore::new(&layout.cache);
  let artifact = store.lookup(&hash).unwrap();
  std::fs::write(artifact.path.join(ARTIFACT_MARKER), "not json").unwrap();
  assert!(store.lookup(&hash).is_none());

  let worker = Arc::new(CountingWorker::default());
  let summary = build(g, worker.clone(), layout, build_options(1), CancelToken::new()).await;
  assert_eq!(worker.calls("base"), 1);
  assert_eq!(summary.get(&hash).unwrap().origin, Some(BuildOrigin::Built));
  assert!(store.lookup(&hash).is_some());
}

#[tokio::test]
async fn cancelled_run_leaves_nothing_building() {
  let root = TempDir::new().unwrap();
  let cancel = CancelToken::new();
  cancel.cancel();

  let worker = Arc::new(CountingWorker::default());
  let summary = build(graph("app"), worker.clone(), BuildLayout::under(root.path()), build_options(2), cancel).await;

  assert!(summary.cancelled);
  assert_eq!(worker.total(), 0);
  assert!(summary.records.values().all(|r| r.status == BuildStatus::NotBuilt));
}

#[tokio::test]
async fn later_runs_bump_generation() {
  let root = TempDir::new().unwrap();
  let g = graph("base");
  let hash = g.root_hashes()[0].clone();
  let mut options = build_options(1);
  options.generations.insert(hash.clone(), 2);

  let summary = build(
    g,
    Arc::new(CountingWorker::default()),
    BuildLayout::under(root.path()),
    options,
    CancelToken::new(),
  )
  .await;
  assert_eq!(summary.get(&hash).unwrap().generation, 3);
}
