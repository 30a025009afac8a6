//! CLI output formatting utilities.
//!
//! Colored status lines, spec/hash formatting and JSON output shared by the
//! subcommands.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use spackle_lib::build::{BuildRecord, BuildStatus};
use spackle_lib::consts::SHORT_HASH_LEN;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const CACHED: &str = "=";
  pub const SKIPPED: &str = "-";
}

pub fn truncate_hash(hash: &str) -> &str {
  let len = hash.len().min(SHORT_HASH_LEN);
  &hash[..len]
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

/// RFC 3339 timestamp for a unix time in seconds.
pub fn format_timestamp(unix_secs: u64) -> String {
  let time = UNIX_EPOCH + Duration::from_secs(unix_secs);
  humantime::format_rfc3339_seconds(time).to_string()
}

/// How long ago `unix_secs` was, coarsened to the largest unit.
pub fn format_age(unix_secs: u64) -> String {
  let now = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(unix_secs);
  let age = now.saturating_sub(unix_secs);
  let coarse = match age {
    0..60 => age,
    60..3600 => age - age % 60,
    3600..86400 => age - age % 3600,
    _ => age - age % 86400,
  };
  format!("{} ago", humantime::format_duration(Duration::from_secs(coarse)))
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// One line per build record: status symbol, name, hash and detail.
pub fn print_record(record: &BuildRecord, cached: bool) {
  let hash = truncate_hash(record.hash.as_ref());
  match record.status {
    BuildStatus::Built if cached => println!(
      "  {} {}-{} (cached)",
      symbols::CACHED.if_supports_color(Stream::Stdout, |s| s.cyan()),
      record.name,
      hash
    ),
    BuildStatus::Built => println!(
      "  {} {}-{}",
      symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
      record.name,
      hash
    ),
    BuildStatus::Failed => {
      let detail = record.failure.as_ref().map(ToString::to_string).unwrap_or_default();
      println!(
        "  {} {}-{}: {}",
        symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
        record.name,
        hash,
        detail
      );
      if let Some(log) = &record.log {
        println!("      {} {}", symbols::ARROW, log.display());
      }
    }
    BuildStatus::NotBuilt | BuildStatus::Building => println!(
      "  {} {}-{} (not built)",
      symbols::SKIPPED.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      record.name,
      hash
    ),
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
