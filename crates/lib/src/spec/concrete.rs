use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::variant::{VariantValue, format_variant};
use super::{AbstractSpec, Compiler, DepTypes, Version};
use crate::util::hash::{HashError, Hashable, SpecHash};

/// Edge from a concrete spec to one of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepEdge {
  pub name: String,
  pub hash: SpecHash,
  pub types: DepTypes,
}

/// One fully decided build configuration.
///
/// Every field feeds the hash, including the hashes of the dependencies, so
/// there is no way to change a concrete spec in place. Values come from the
/// graph builder or from a verified lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcreteSpec {
  name: String,
  namespace: String,
  version: Version,
  variants: BTreeMap<String, VariantValue>,
  compiler: Compiler,
  target: String,
  dependencies: Vec<DepEdge>,
  hash: SpecHash,
}

/// Canonical hash input. Field order here is part of the hash format.
#[derive(Serialize)]
struct Identity<'a> {
  name: &'a str,
  namespace: &'a str,
  /// Canonical, so spellings of one version share a hash.
  version: String,
  variants: &'a BTreeMap<String, VariantValue>,
  compiler: &'a Compiler,
  target: &'a str,
  dependencies: &'a [DepEdge],
}

impl Hashable for Identity<'_> {}

impl ConcreteSpec {
  pub(crate) fn new(
    name: String,
    namespace: String,
    version: Version,
    variants: BTreeMap<String, VariantValue>,
    compiler: Compiler,
    target: String,
    mut dependencies: Vec<DepEdge>,
  ) -> Result<Self, HashError> {
    dependencies.sort_by(|a, b| a.name.cmp(&b.name));
    let hash = Identity {
      name: &name,
      namespace: &namespace,
      version: version.canonical(),
      variants: &variants,
      compiler: &compiler,
      target: &target,
      dependencies: &dependencies,
    }
    .compute_hash()?;

    Ok(ConcreteSpec {
      name,
      namespace,
      version,
      variants,
      compiler,
      target,
      dependencies,
      hash,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn namespace(&self) -> &str {
    &self.namespace
  }

  pub fn version(&self) -> &Version {
    &self.version
  }

  pub fn variants(&self) -> &BTreeMap<String, VariantValue> {
    &self.variants
  }

  pub fn compiler(&self) -> &Compiler {
    &self.compiler
  }

  pub fn target(&self) -> &str {
    &self.target
  }

  /// Dependency edges, sorted by name.
  pub fn dependencies(&self) -> &[DepEdge] {
    &self.dependencies
  }

  pub fn hash(&self) -> &SpecHash {
    &self.hash
  }

  pub fn short_hash(&self) -> &str {
    self.hash.short()
  }

  /// Recomputes the hash from the fields and compares it to the stored one.
  pub fn verify_hash(&self) -> bool {
    let sorted = self.dependencies.windows(2).all(|w| w[0].name < w[1].name);
    let recomputed = Identity {
      name: &self.name,
      namespace: &self.namespace,
      version: self.version.canonical(),
      variants: &self.variants,
      compiler: &self.compiler,
      target: &self.target,
      dependencies: &self.dependencies,
    }
    .compute_hash();
    sorted && recomputed.is_ok_and(|h| h == self.hash)
  }

  /// Checks this node against a request. `^dep` constraints are not
  /// considered here; the graph checks those.
  pub fn satisfies(&self, spec: &AbstractSpec) -> bool {
    Config {
      name: &self.name,
      namespace: &self.namespace,
      version: &self.version,
      variants: &self.variants,
      compiler: &self.compiler,
      target: &self.target,
    }
    .satisfies(spec)
  }

  /// Install prefix directory name: `<name>-<version>-<hash>`.
  pub fn prefix_name(&self) -> String {
    format!("{}-{}-{}", self.name, self.version, self.hash)
  }
}

/// Borrowed view of one package configuration, concrete or in progress.
pub(crate) struct Config<'a> {
  pub name: &'a str,
  pub namespace: &'a str,
  pub version: &'a Version,
  pub variants: &'a BTreeMap<String, VariantValue>,
  pub compiler: &'a Compiler,
  pub target: &'a str,
}

impl Config<'_> {
  pub(crate) fn satisfies(&self, spec: &AbstractSpec) -> bool {
    if spec.name().is_some_and(|n| n != self.name) {
      return false;
    }
    if spec.namespace().is_some_and(|ns| ns != self.namespace) {
      return false;
    }
    if !spec.versions().satisfied_by(self.version) {
      return false;
    }
    let variants_ok = spec
      .variants()
      .iter()
      .all(|(name, wanted)| self.variants.get(name).is_some_and(|have| have.satisfies(wanted)));
    if !variants_ok {
      return false;
    }
    if spec.compiler().is_some_and(|c| !self.compiler.satisfies(c)) {
      return false;
    }
    spec.target().is_none_or(|t| t == self.target)
  }
}

impl fmt::Display for ConcreteSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.name, self.version)?;
    for (name, value) in self.variants.iter().filter(|(_, v)| matches!(v, VariantValue::Bool(_))) {
      f.write_str(&format_variant(name, value))?;
    }
    for (name, value) in self.variants.iter().filter(|(_, v)| !matches!(v, VariantValue::Bool(_))) {
      f.write_str(&format_variant(name, value))?;
    }
    write!(f, " {} target={}", self.compiler, self.target)
  }
}
