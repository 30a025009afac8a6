//! The build coordinator.
//!
//! One loop owns every [`BuildRecord`]. It keeps a FIFO queue of nodes whose
//! dependencies are all built and hands them to at most `jobs` tasks. Tasks
//! report back with an outcome; the loop records it, releases dependents on
//! success and fails every pending dependent on failure.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use tokio::task::{Id, JoinSet};
use tracing::{debug, error, info, warn};

use crate::build::cancel::CancelToken;
use crate::build::phase::job_paths;
use crate::build::stage::{stage, with_retries};
use crate::build::types::{
  BuildError, BuildFailure, BuildLayout, BuildOptions, BuildOrigin, BuildRecord, BuildStatus, BuildSummary,
};
use crate::build::worker::{BuildJob, BuildWorker, DependencyPrefix};
use crate::graph::ConcretizationGraph;
use crate::store::ArtifactStore;
use crate::util::hash::SpecHash;

enum Outcome {
  Built {
    origin: BuildOrigin,
    prefix: std::path::PathBuf,
    log: Option<std::path::PathBuf>,
  },
  Failed {
    failure: BuildFailure,
    log: Option<std::path::PathBuf>,
  },
}

struct Shared<W> {
  worker: Arc<W>,
  store: ArtifactStore,
  options: BuildOptions,
}

/// Builds every node of `graph`, dependencies first.
///
/// Never fails as a whole: per-node failures end up in the returned records.
/// After cancellation no new node is started; nodes already running finish
/// and are recorded, the rest stay `not-built`.
pub async fn build<W: BuildWorker>(
  graph: Arc<ConcretizationGraph>,
  worker: Arc<W>,
  layout: BuildLayout,
  options: BuildOptions,
  cancel: CancelToken,
) -> BuildSummary {
  let order: Vec<SpecHash> = graph.topological_order().into_iter().cloned().collect();
  let mut records: BTreeMap<SpecHash, BuildRecord> = BTreeMap::new();
  let mut waiting: HashMap<SpecHash, usize> = HashMap::new();
  let mut ready: VecDeque<SpecHash> = VecDeque::new();

  for hash in &order {
    let Some(spec) = graph.get(hash) else { continue };
    records.insert(hash.clone(), BuildRecord::new(spec, options.generation_for(hash)));
    let deps = spec.dependencies().len();
    waiting.insert(hash.clone(), deps);
    if deps == 0 {
      ready.push_back(hash.clone());
    }
  }

  let jobs = options.jobs.max(1);
  info!(nodes = records.len(), jobs, "starting build");

  let shared = Arc::new(Shared {
    worker,
    store: ArtifactStore::new(&layout.cache),
    options,
  });
  let mut tasks: JoinSet<Outcome> = JoinSet::new();
  let mut in_flight: HashMap<Id, SpecHash> = HashMap::new();
  let mut cancelled = cancel.is_cancelled();

  loop {
    while !cancelled
      && tasks.len() < jobs
      && let Some(hash) = ready.pop_front()
    {
      let Some(record) = records.get_mut(&hash) else { continue };
      if !record.start() {
        continue;
      }
      let Some(job) = make_job(&graph, &layout, &hash) else { continue };
      debug!(name = %job.spec.name(), hash = %hash.short(), "dispatching");
      let handle = tasks.spawn(run_node(shared.clone(), job));
      in_flight.insert(handle.id(), hash);
    }

    if tasks.is_empty() {
      break;
    }

    tokio::select! {
      biased;
      _ = cancel.cancelled(), if !cancelled => {
        cancelled = true;
        warn!(in_flight = tasks.len(), "build cancelled, waiting for running nodes");
      }
      Some(joined) = tasks.join_next_with_id() => {
        let (id, outcome) = match joined {
          Ok((id, outcome)) => (id, outcome),
          Err(e) => {
            let message = if e.is_panic() { "worker panicked".to_string() } else { e.to_string() };
            (e.id(), Outcome::Failed { failure: BuildFailure::Direct { message }, log: None })
          }
        };
        let Some(hash) = in_flight.remove(&id) else {
          error!("finished task has no node");
          continue;
        };
        if let Outcome::Built { origin: BuildOrigin::Cached, .. } = outcome
          && let Some(previous) = shared.options.generations.get(&hash)
          && let Some(record) = records.get_mut(&hash)
        {
          // Nothing was rebuilt, so the installed generation stands
          record.generation = *previous;
        }
        record_outcome(&graph, &mut records, &mut waiting, &mut ready, &hash, outcome);
      }
    }
  }

  let summary = BuildSummary { records, cancelled };
  info!(
    built = summary.built().len(),
    cached = summary.cached().len(),
    failed = summary.failed().len(),
    propagated = summary.propagated().len(),
    not_built = summary.not_built().len(),
    "build finished"
  );
  summary
}

fn make_job(graph: &ConcretizationGraph, layout: &BuildLayout, hash: &SpecHash) -> Option<BuildJob> {
  let spec = graph.get(hash)?;
  let scratch = layout.scratch_dir(spec);
  let (output, log) = job_paths(&scratch);
  let dependencies = spec
    .dependencies()
    .iter()
    .filter_map(|edge| {
      graph.get(&edge.hash).map(|dep| DependencyPrefix {
        name: edge.name.clone(),
        prefix: layout.prefix(dep),
        types: edge.types.clone(),
      })
    })
    .collect();
  Some(BuildJob {
    spec: spec.clone(),
    prefix: layout.prefix(spec),
    scratch,
    output,
    log,
    dependencies,
  })
}

fn record_outcome(
  graph: &ConcretizationGraph,
  records: &mut BTreeMap<SpecHash, BuildRecord>,
  waiting: &mut HashMap<SpecHash, usize>,
  ready: &mut VecDeque<SpecHash>,
  hash: &SpecHash,
  outcome: Outcome,
) {
  let Some(record) = records.get_mut(hash) else { return };
  match outcome {
    Outcome::Built { origin, prefix, log } => {
      info!(name = %record.name, hash = %hash.short(), origin = ?origin, "built");
      record.succeed(origin, prefix, log);
      for dependent in graph.dependents(hash) {
        let Some(count) = waiting.get_mut(dependent.hash()) else { continue };
        *count = count.saturating_sub(1);
        if *count == 0 && records.get(dependent.hash()).map(|r| r.status) == Some(BuildStatus::NotBuilt) {
          ready.push_back(dependent.hash().clone());
        }
      }
    }
    Outcome::Failed { failure, log } => {
      error!(name = %record.name, hash = %hash.short(), error = %failure, "build failed");
      record.fail(failure, log);
      propagate_failure(graph, records, hash);
    }
  }
}

/// Fails everything still pending above `failed`.
fn propagate_failure(graph: &ConcretizationGraph, records: &mut BTreeMap<SpecHash, BuildRecord>, failed: &SpecHash) {
  let mut stack = vec![failed.clone()];
  while let Some(current) = stack.pop() {
    for dependent in graph.dependents(&current) {
      let Some(record) = records.get_mut(dependent.hash()) else { continue };
      if record.status != BuildStatus::NotBuilt {
        continue;
      }
      warn!(name = %record.name, failed_dep = %failed.short(), "skipping build due to failed dependency");
      record.fail(BuildFailure::Propagated { from: failed.clone() }, None);
      stack.push(dependent.hash().clone());
    }
  }
}

/// Everything that happens to one node off the coordinator.
async fn run_node<W: BuildWorker>(shared: Arc<Shared<W>>, job: BuildJob) -> Outcome {
  let options = &shared.options;
  let hash = job.spec.hash().clone();

  let store = shared.store.clone();
  let lookup_hash = hash.clone();
  let cached = match tokio::task::spawn_blocking(move || store.lookup(&lookup_hash)).await {
    Ok(found) => found,
    Err(e) => return failed(BuildError::Join(e), None),
  };

  if let Some(artifact) = cached {
    debug!(hash = %hash.short(), "using cached artifact");
    let spec = job.spec.clone();
    let prefix = job.prefix.clone();
    return match with_retries("staging", options.io_retries, options.retry_backoff, move || {
      stage(&artifact, &spec, &prefix, None)
    })
    .await
    {
      Ok(_) => Outcome::Built {
        origin: BuildOrigin::Cached,
        prefix: job.prefix,
        log: None,
      },
      Err(failure) => Outcome::Failed { failure, log: None },
    };
  }

  let scratch = job.scratch.clone();
  let prepared = tokio::task::spawn_blocking(move || {
    if scratch.exists() {
      std::fs::remove_dir_all(&scratch)?;
    }
    std::fs::create_dir_all(&scratch)
  })
  .await;
  match prepared {
    Ok(Ok(())) => {}
    Ok(Err(source)) => {
      return failed(
        BuildError::Scratch {
          path: job.scratch.clone(),
          source,
        },
        None,
      );
    }
    Err(e) => return failed(BuildError::Join(e), None),
  }

  if let Err(e) = shared.worker.build(&job).await {
    let log = job.log.exists().then(|| job.log.clone());
    return Outcome::Failed {
      failure: BuildFailure::Direct { message: e.to_string() },
      log,
    };
  }

  let store = shared.store.clone();
  let store_hash = hash.clone();
  let output = job.output.clone();
  let artifact = match with_retries("storing", options.io_retries, options.retry_backoff, move || {
    store.store(&store_hash, &output)
  })
  .await
  {
    Ok(artifact) => artifact,
    Err(failure) => {
      return Outcome::Failed {
        failure,
        log: Some(job.log.clone()),
      };
    }
  };

  let spec = job.spec.clone();
  let prefix = job.prefix.clone();
  let log = job.log.exists().then(|| job.log.clone());
  let staged_log = log.clone();
  let installed_log = match with_retries("staging", options.io_retries, options.retry_backoff, move || {
    stage(&artifact, &spec, &prefix, staged_log.as_deref())
  })
  .await
  {
    Ok(installed_log) => installed_log,
    Err(failure) => return Outcome::Failed { failure, log },
  };

  if !options.keep_stage {
    let scratch = job.scratch.clone();
    if let Ok(Err(e)) = tokio::task::spawn_blocking(move || std::fs::remove_dir_all(&scratch)).await {
      warn!(path = %job.scratch.display(), error = %e, "failed to remove scratch directory");
    }
  }

  Outcome::Built {
    origin: BuildOrigin::Built,
    prefix: job.prefix,
    log: installed_log,
  }
}

fn failed(error: BuildError, log: Option<std::path::PathBuf>) -> Outcome {
  Outcome::Failed {
    failure: BuildFailure::Direct {
      message: error.to_string(),
    },
    log,
  }
}
