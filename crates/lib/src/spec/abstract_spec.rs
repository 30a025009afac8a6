use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::parse::{self, SpecParseError};
use super::variant::{VariantError, VariantValue, format_variant};
use super::{CompilerSpec, VersionConstraint};
use crate::repo::PackageDefinition;

/// A possibly partial package request.
///
/// Built by parsing a spec string; immutable afterwards. The name is optional
/// so that recipe `when` conditions and conflicts (`+shared`, `@:1.9`) use the
/// same type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AbstractSpec {
  pub(crate) namespace: Option<String>,
  pub(crate) name: Option<String>,
  pub(crate) versions: VersionConstraint,
  pub(crate) variants: BTreeMap<String, VariantValue>,
  pub(crate) compiler: Option<CompilerSpec>,
  pub(crate) target: Option<String>,
  pub(crate) dependencies: Vec<AbstractSpec>,
}

impl AbstractSpec {
  /// Parses exactly one spec (with any `^dep` constraints).
  pub fn parse(input: &str) -> Result<Self, SpecParseError> {
    let mut specs = parse::parse_specs(input)?;
    match specs.len() {
      0 => Err(SpecParseError::new(input, 0, "empty spec")),
      1 => Ok(specs.remove(0)),
      _ => Err(SpecParseError::new(input, 0, "expected a single spec")),
    }
  }

  /// Parses a command line worth of specs: `zlib@1.3 openssl+shared ^zlib`.
  pub fn parse_many(input: &str) -> Result<Vec<Self>, SpecParseError> {
    parse::parse_specs(input)
  }

  pub fn named(name: &str) -> Self {
    AbstractSpec {
      name: Some(name.to_string()),
      ..Default::default()
    }
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }

  pub fn namespace(&self) -> Option<&str> {
    self.namespace.as_deref()
  }

  pub fn versions(&self) -> &VersionConstraint {
    &self.versions
  }

  pub fn variants(&self) -> &BTreeMap<String, VariantValue> {
    &self.variants
  }

  pub fn compiler(&self) -> Option<&CompilerSpec> {
    self.compiler.as_ref()
  }

  pub fn target(&self) -> Option<&str> {
    self.target.as_deref()
  }

  pub fn dependencies(&self) -> &[AbstractSpec] {
    &self.dependencies
  }

  /// True if nothing besides the name is constrained.
  pub fn is_bare(&self) -> bool {
    self.versions.is_any()
      && self.variants.is_empty()
      && self.compiler.is_none()
      && self.target.is_none()
      && self.dependencies.is_empty()
  }

  /// Checks variant names and values against the package's recipe.
  pub fn validate(&self, def: &PackageDefinition) -> Result<(), VariantError> {
    self.normalized_variants(def).map(|_| ())
  }

  /// Variant requests coerced to the shapes the recipe declares, e.g. a
  /// single value for a multi-valued variant becomes a one-element set.
  pub fn normalized_variants(&self, def: &PackageDefinition) -> Result<BTreeMap<String, VariantValue>, VariantError> {
    let mut out = BTreeMap::new();
    for (name, value) in &self.variants {
      let Some(decl) = def.variant(name) else {
        return Err(VariantError::Unknown {
          package: def.name.clone(),
          variant: name.clone(),
        });
      };
      out.insert(name.clone(), decl.normalize(&def.name, value)?);
    }
    Ok(out)
  }
}

impl fmt::Display for AbstractSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut out = String::new();
    if let Some(ns) = &self.namespace {
      out.push_str(ns);
      out.push('.');
    }
    if let Some(name) = &self.name {
      out.push_str(name);
    }
    if !self.versions.is_any() {
      out.push('@');
      out.push_str(&self.versions.to_string());
    }
    // bools first so `+a~b` stays glued to the name
    for (name, value) in self.variants.iter().filter(|(_, v)| matches!(v, VariantValue::Bool(_))) {
      out.push_str(&format_variant(name, value));
    }
    for (name, value) in self.variants.iter().filter(|(_, v)| !matches!(v, VariantValue::Bool(_))) {
      out.push_str(&format_variant(name, value));
    }
    if let Some(compiler) = &self.compiler {
      out.push(' ');
      out.push_str(&compiler.to_string());
    }
    if let Some(target) = &self.target {
      out.push_str(" target=");
      out.push_str(target);
    }
    for dep in &self.dependencies {
      out.push_str(" ^");
      out.push_str(&dep.to_string());
    }
    f.write_str(out.trim_start())
  }
}

impl FromStr for AbstractSpec {
  type Err = SpecParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    AbstractSpec::parse(s)
  }
}

impl TryFrom<String> for AbstractSpec {
  type Error = SpecParseError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    AbstractSpec::parse(&value)
  }
}

impl From<AbstractSpec> for String {
  fn from(value: AbstractSpec) -> Self {
    value.to_string()
  }
}
