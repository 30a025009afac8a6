//! Package recipes as data.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::spec::{AbstractSpec, DepTypes, VariantError, VariantValue, Version};

/// A package recipe, loaded from `<repo>/packages/<name>/package.json`.
///
/// ```json
/// {
///   "name": "zlib",
///   "versions": [{ "version": "1.3.1", "sha256": "9a93...", "preferred": true }],
///   "variants": [{ "name": "shared", "default": true }],
///   "dependencies": [{ "spec": "cmake@3.20:", "type": ["build"], "when": "+shared" }],
///   "conflicts": [{ "spec": "%clang@:9", "msg": "needs C11 atomics" }],
///   "phases": [{ "name": "install", "run": "make install PREFIX=$prefix" }]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDefinition {
  pub name: String,
  /// Filled in from the owning repository's `repo.json`.
  #[serde(default)]
  pub namespace: String,
  #[serde(default)]
  pub description: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub homepage: Option<String>,
  pub versions: Vec<VersionDef>,
  #[serde(default)]
  pub variants: Vec<VariantDef>,
  #[serde(default)]
  pub dependencies: Vec<DependencyDef>,
  #[serde(default)]
  pub conflicts: Vec<ConflictDef>,
  #[serde(default)]
  pub phases: Vec<PhaseDef>,
  /// Directory holding the recipe (and any patches shipped with it).
  #[serde(skip)]
  pub recipe_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDef {
  pub version: Version,
  pub sha256: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  #[serde(default)]
  pub preferred: bool,
  #[serde(default)]
  pub deprecated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDef {
  pub name: String,
  pub default: VariantValue,
  /// Allowed values; empty means any value for non-bool variants.
  #[serde(default)]
  pub values: Vec<String>,
  #[serde(default)]
  pub multi: bool,
  #[serde(default)]
  pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyDef {
  pub spec: AbstractSpec,
  /// Condition on the depender, e.g. `+shared` or `@2:`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub when: Option<AbstractSpec>,
  #[serde(rename = "type", default)]
  pub types: DepTypes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictDef {
  /// Configuration of this package that cannot be built.
  pub spec: AbstractSpec,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub when: Option<AbstractSpec>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub msg: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDef {
  pub name: String,
  pub run: String,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
}

impl VariantDef {
  pub fn is_bool(&self) -> bool {
    matches!(self.default, VariantValue::Bool(_))
  }

  /// Coerces a requested value into the shape this variant declares and
  /// checks it against the allowed values.
  pub fn normalize(&self, package: &str, value: &VariantValue) -> Result<VariantValue, VariantError> {
    let invalid = || VariantError::InvalidValue {
      package: package.to_string(),
      variant: self.name.clone(),
      value: value.to_string(),
      allowed: self.allowed_display(),
    };

    let shaped = match (&self.default, value) {
      (VariantValue::Bool(_), VariantValue::Bool(b)) => VariantValue::Bool(*b),
      (VariantValue::Bool(_), _) | (_, VariantValue::Bool(_)) => return Err(invalid()),
      (_, v) if self.multi => VariantValue::Multi(
        v.values()
          .into_iter()
          .flat_map(|s| s.split(','))
          .filter(|s| !s.is_empty())
          .map(String::from)
          .collect(),
      ),
      (_, VariantValue::Single(s)) => VariantValue::Single(s.clone()),
      (_, VariantValue::Multi(set)) => match set.iter().next() {
        Some(only) if set.len() == 1 => VariantValue::Single(only.clone()),
        _ => return Err(invalid()),
      },
    };

    if !self.values.is_empty() && shaped.values().iter().any(|v| !self.values.iter().any(|a| a == v)) {
      return Err(invalid());
    }
    Ok(shaped)
  }

  /// The declared default, in normalized form.
  pub fn default_value(&self, package: &str) -> VariantValue {
    self
      .normalize(package, &self.default)
      .unwrap_or_else(|_| self.default.clone())
  }

  fn allowed_display(&self) -> String {
    if self.is_bool() {
      "true, false".to_string()
    } else if self.values.is_empty() {
      "any".to_string()
    } else {
      self.values.join(", ")
    }
  }
}

impl PackageDefinition {
  pub fn variant(&self, name: &str) -> Option<&VariantDef> {
    self.variants.iter().find(|v| v.name == name)
  }

  pub fn version(&self, version: &Version) -> Option<&VersionDef> {
    self.versions.iter().find(|v| &v.version == version)
  }

  /// Declared versions, newest first.
  pub fn versions_descending(&self) -> Vec<&VersionDef> {
    let mut versions: Vec<&VersionDef> = self.versions.iter().collect();
    versions.sort_by(|a, b| b.version.cmp(&a.version));
    versions
  }

  pub fn preferred_version(&self) -> Option<&VersionDef> {
    self.versions.iter().find(|v| v.preferred && !v.deprecated)
  }

  pub fn default_variants(&self) -> BTreeMap<String, VariantValue> {
    self
      .variants
      .iter()
      .map(|v| (v.name.clone(), v.default_value(&self.name)))
      .collect()
  }

  /// Static checks on a freshly loaded recipe.
  pub fn validate(&self) -> Result<(), String> {
    if self.name.is_empty() {
      return Err("package name is empty".into());
    }
    if self.versions.is_empty() {
      return Err("no versions declared".into());
    }

    let mut seen = BTreeSet::new();
    for v in &self.versions {
      if !seen.insert(v.version.clone()) {
        return Err(format!("version {} declared twice", v.version));
      }
      if v.sha256.len() != 64 || !v.sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(format!("version {} has a malformed sha256 checksum", v.version));
      }
    }
    if self.versions.iter().filter(|v| v.preferred).count() > 1 {
      return Err("more than one preferred version".into());
    }

    let mut names = BTreeSet::new();
    for variant in &self.variants {
      if !names.insert(variant.name.as_str()) {
        return Err(format!("variant '{}' declared twice", variant.name));
      }
      if variant.name == "target" {
        return Err("'target' is reserved and cannot be a variant".into());
      }
      variant.normalize(&self.name, &variant.default).map_err(|e| e.to_string())?;
    }

    for dep in &self.dependencies {
      if dep.spec.name().is_none() {
        return Err(format!("dependency '{}' has no package name", dep.spec));
      }
      self.check_condition(dep.when.as_ref())?;
    }
    for conflict in &self.conflicts {
      self.check_condition(Some(&conflict.spec))?;
      self.check_condition(conflict.when.as_ref())?;
    }

    let mut phases = BTreeSet::new();
    for phase in &self.phases {
      if !phases.insert(phase.name.as_str()) {
        return Err(format!("phase '{}' declared twice", phase.name));
      }
    }
    Ok(())
  }

  /// Conditions describe this package, so they are anonymous or name it, and
  /// their variants must exist.
  fn check_condition(&self, cond: Option<&AbstractSpec>) -> Result<(), String> {
    let Some(cond) = cond else { return Ok(()) };
    if cond.name().is_some_and(|n| n != self.name) {
      return Err(format!("condition '{}' names another package", cond));
    }
    if !cond.dependencies().is_empty() {
      return Err(format!("condition '{}' may not constrain dependencies", cond));
    }
    cond.validate(self).map_err(|e| e.to_string())
  }
}
