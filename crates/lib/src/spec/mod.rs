//! Spec model: abstract requests and concrete, hashed configurations.
//!
//! An [`AbstractSpec`] is what a user or a recipe asks for (`zlib@1.2:+shared`).
//! A [`ConcreteSpec`] is one fully decided configuration with a content hash.
//! Concrete specs are only created inside the crate, by the graph builder and
//! the lockfile loader.

mod abstract_spec;
pub(crate) mod concrete;
mod parse;
pub mod variant;
pub mod version;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use abstract_spec::AbstractSpec;
pub use concrete::{ConcreteSpec, DepEdge};
pub(crate) use concrete::Config;
pub use parse::SpecParseError;
pub use variant::{VariantError, VariantValue};
pub use version::{Version, VersionConstraint, VersionError, VersionRange};

/// How a dependent uses a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepType {
  Build,
  Link,
  Run,
}

impl DepType {
  pub fn as_str(&self) -> &'static str {
    match self {
      DepType::Build => "build",
      DepType::Link => "link",
      DepType::Run => "run",
    }
  }
}

impl fmt::Display for DepType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Non-empty set of dependency types. Defaults to `{build, link}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<DepType>", into = "Vec<DepType>")]
pub struct DepTypes(BTreeSet<DepType>);

impl DepTypes {
  pub fn new(types: impl IntoIterator<Item = DepType>) -> Option<Self> {
    let set: BTreeSet<DepType> = types.into_iter().collect();
    (!set.is_empty()).then_some(DepTypes(set))
  }

  pub fn contains(&self, ty: DepType) -> bool {
    self.0.contains(&ty)
  }

  pub fn iter(&self) -> impl Iterator<Item = DepType> + '_ {
    self.0.iter().copied()
  }

  /// Union with another set; used when two declarations name the same dependency.
  pub fn merged(&self, other: &DepTypes) -> DepTypes {
    DepTypes(self.0.union(&other.0).copied().collect())
  }
}

impl Default for DepTypes {
  fn default() -> Self {
    DepTypes(BTreeSet::from([DepType::Build, DepType::Link]))
  }
}

impl TryFrom<Vec<DepType>> for DepTypes {
  type Error = &'static str;

  fn try_from(value: Vec<DepType>) -> Result<Self, Self::Error> {
    DepTypes::new(value).ok_or("dependency types must not be empty")
  }
}

impl From<DepTypes> for Vec<DepType> {
  fn from(value: DepTypes) -> Self {
    value.0.into_iter().collect()
  }
}

impl fmt::Display for DepTypes {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let names: Vec<&str> = self.0.iter().map(DepType::as_str).collect();
    f.write_str(&names.join(","))
  }
}

/// A compiler request: `%gcc@12:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CompilerSpec {
  pub name: String,
  pub versions: VersionConstraint,
}

impl fmt::Display for CompilerSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "%{}", self.name)?;
    if !self.versions.is_any() {
      write!(f, "@{}", self.versions)?;
    }
    Ok(())
  }
}

/// A concrete compiler: name and exact version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Compiler {
  pub name: String,
  pub version: Version,
}

impl Compiler {
  /// Stand-in used when no compilers are configured: whatever `cc` the
  /// build environment provides.
  pub fn system() -> Self {
    Compiler {
      name: "system".to_string(),
      version: Version::from_numbers(&[1, 0]),
    }
  }

  pub fn satisfies(&self, spec: &CompilerSpec) -> bool {
    self.name == spec.name && spec.versions.satisfied_by(&self.version)
  }
}

impl fmt::Display for Compiler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "%{}@{}", self.name, self.version)
  }
}
