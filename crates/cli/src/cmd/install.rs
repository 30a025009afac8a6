//! `spackle install`: solve, build and record.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::warn;

use spackle_lib::build::{BuildOrigin, BuildSummary, CancelToken, PhaseWorker};
use spackle_lib::graph::ConcretizationGraph;
use spackle_lib::install::{InstallRequest, InstallSettings, install};

use super::{load_config, load_repos, parse_specs};
use crate::output::{OutputFormat, format_duration, print_info, print_json, print_record, print_stat, print_success};

pub struct InstallArgs {
  pub specs: Vec<String>,
  pub jobs: Option<usize>,
  pub reuse: bool,
  pub env: Option<String>,
  pub keep_stage: bool,
  pub output: OutputFormat,
}

pub fn cmd_install(args: InstallArgs) -> Result<()> {
  let start = Instant::now();

  let config = load_config()?;
  let repos = Arc::new(load_repos(&config)?);
  let specs = parse_specs(&args.specs)?;

  let mut settings = InstallSettings::from_config(&config);
  if let Some(jobs) = args.jobs {
    settings.build.jobs = jobs.max(1);
  }
  settings.solve.reuse |= args.reuse;
  settings.build.keep_stage |= args.keep_stage;

  let worker = Arc::new(PhaseWorker::new(repos.clone()).with_base_path(config.build.base_path.clone()));
  let request = InstallRequest {
    specs,
    environment: args.env,
  };

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(async {
      let cancel = CancelToken::new();
      let on_interrupt = cancel.clone();
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          warn!("interrupted, waiting for running builds to finish");
          on_interrupt.cancel();
        }
      });
      install(&request, &repos, worker, &settings, cancel).await
    })
    .context("Install failed")?;

  let summary = &report.summary;
  if args.output.is_json() {
    print_json(summary)?;
  } else {
    print_summary(&report.graph, summary);
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  if summary.cancelled {
    bail!("Install cancelled; {} package(s) were not built", summary.not_built().len());
  }
  if !summary.is_success() {
    bail!(
      "{} package(s) failed to build, {} skipped",
      summary.failed().len(),
      summary.propagated().len()
    );
  }
  Ok(())
}

fn print_summary(graph: &ConcretizationGraph, summary: &BuildSummary) {
  for hash in graph.topological_order() {
    if let Some(record) = summary.get(hash) {
      print_record(record, record.origin == Some(BuildOrigin::Cached));
    }
  }

  println!();
  if summary.is_success() {
    print_success("Install complete!");
  } else {
    print_info("Install finished with errors");
  }
  print_stat("Built", &summary.built().len().to_string());
  print_stat("Cached", &summary.cached().len().to_string());
  print_stat("Failed", &summary.failed().len().to_string());
  print_stat("Skipped", &summary.propagated().len().to_string());
  if summary.cancelled {
    print_stat("Not built", &summary.not_built().len().to_string());
  }
}
