//! Variant values.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a build variant, in a request or a concrete spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
  Bool(bool),
  Single(String),
  Multi(BTreeSet<String>),
}

impl VariantValue {
  /// Parses the right-hand side of `key=value`.
  pub fn from_assignment(value: &str) -> Self {
    match value {
      "true" => VariantValue::Bool(true),
      "false" => VariantValue::Bool(false),
      v if v.contains(',') => VariantValue::Multi(v.split(',').filter(|s| !s.is_empty()).map(String::from).collect()),
      v => VariantValue::Single(v.to_string()),
    }
  }

  /// Individual values named by this value (a bool names nothing).
  pub fn values(&self) -> Vec<&str> {
    match self {
      VariantValue::Bool(_) => Vec::new(),
      VariantValue::Single(v) => vec![v.as_str()],
      VariantValue::Multi(vs) => vs.iter().map(String::as_str).collect(),
    }
  }

  /// True if a concrete assignment `self` meets the requested `wanted`.
  ///
  /// For multi-valued variants a request is met when every requested value
  /// is present.
  pub fn satisfies(&self, wanted: &VariantValue) -> bool {
    match (self, wanted) {
      (VariantValue::Bool(a), VariantValue::Bool(b)) => a == b,
      (VariantValue::Single(a), VariantValue::Single(b)) => a == b,
      (VariantValue::Multi(have), VariantValue::Single(w)) => have.contains(w),
      (VariantValue::Multi(have), VariantValue::Multi(w)) => w.is_subset(have),
      (VariantValue::Single(a), VariantValue::Multi(w)) => w.len() == 1 && w.contains(a),
      _ => false,
    }
  }
}

impl fmt::Display for VariantValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VariantValue::Bool(b) => write!(f, "{}", b),
      VariantValue::Single(v) => f.write_str(v),
      VariantValue::Multi(vs) => {
        let joined: Vec<&str> = vs.iter().map(String::as_str).collect();
        f.write_str(&joined.join(","))
      }
    }
  }
}

/// Formats one variant the way spec strings spell it: `+name`, `~name`, `name=v`.
pub fn format_variant(name: &str, value: &VariantValue) -> String {
  match value {
    VariantValue::Bool(true) => format!("+{}", name),
    VariantValue::Bool(false) => format!("~{}", name),
    other => format!(" {}={}", name, other),
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariantError {
  #[error("package '{package}' has no variant '{variant}'")]
  Unknown { package: String, variant: String },

  #[error("invalid value '{value}' for variant '{variant}' of '{package}' (allowed: {allowed})")]
  InvalidValue {
    package: String,
    variant: String,
    value: String,
    allowed: String,
  },
}
