//! Gathering constraints for one solver round.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use super::SolveError;
use super::choose::Choice;
use crate::repo::{PackageDefinition, RepoError, RepoPath};
use crate::spec::{AbstractSpec, CompilerSpec, DepTypes, VariantValue, VersionConstraint};

/// A constraint plus where it came from, for error messages.
#[derive(Debug, Clone)]
pub(super) struct Sourced<T> {
  pub value: T,
  pub origin: String,
  /// Requested by the user rather than imposed by a recipe.
  pub explicit: bool,
  /// The package whose recipe imposed this, if any.
  pub imposed_by: Option<String>,
}

impl<T> Sourced<T> {
  fn new(value: T, origin: &str, imposed_by: Option<&str>) -> Self {
    Sourced {
      value,
      origin: origin.to_string(),
      explicit: imposed_by.is_none(),
      imposed_by: imposed_by.map(String::from),
    }
  }
}

impl<T: fmt::Display> fmt::Display for Sourced<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} (from {})", self.value, self.origin)
  }
}

/// Everything asked of one package in a round.
#[derive(Debug)]
pub(super) struct PackageConstraints {
  pub def: Arc<PackageDefinition>,
  pub versions: Vec<Sourced<VersionConstraint>>,
  pub variants: BTreeMap<String, Vec<Sourced<VariantValue>>>,
  pub compilers: Vec<Sourced<CompilerSpec>>,
  pub targets: Vec<Sourced<String>>,
}

impl PackageConstraints {
  fn new(def: Arc<PackageDefinition>) -> Self {
    PackageConstraints {
      def,
      versions: Vec::new(),
      variants: BTreeMap::new(),
      compilers: Vec::new(),
      targets: Vec::new(),
    }
  }
}

/// Result of walking the active dependency declarations from the roots.
#[derive(Debug, Default)]
pub(super) struct Requirements {
  pub packages: BTreeMap<String, PackageConstraints>,
  /// depender -> dependency -> types
  pub edges: BTreeMap<String, BTreeMap<String, DepTypes>>,
  /// Packages reachable from the roots through active declarations.
  pub reachable: BTreeSet<String>,
}

impl Requirements {
  /// Walks from the roots. Conditional declarations are active only when the
  /// depender's choice from the previous round meets the condition; a
  /// package without a previous choice contributes its unconditional
  /// dependencies only.
  pub fn collect(roots: &[AbstractSpec], repo: &RepoPath, previous: &BTreeMap<String, Choice>) -> Result<Self, SolveError> {
    let mut reqs = Requirements::default();
    let mut queue = VecDeque::new();

    for root in roots {
      let origin = format!("root '{}'", root);
      let name = reqs.add(repo, root, &origin, None)?;
      queue.push_back(name);
      for dep in root.dependencies() {
        reqs.add(repo, dep, &format!("'^{}' in root '{}'", dep, root), None)?;
      }
    }

    while let Some(name) = queue.pop_front() {
      if !reqs.reachable.insert(name.clone()) {
        continue;
      }
      let Some(def) = reqs.packages.get(&name).map(|p| p.def.clone()) else {
        continue;
      };
      let choice = previous.get(&name);

      for decl in &def.dependencies {
        let active = match (&decl.when, choice) {
          (None, _) => true,
          (Some(when), Some(choice)) => choice.satisfies(when),
          (Some(_), None) => false,
        };
        if !active {
          continue;
        }

        let origin = match choice {
          Some(c) => format!("{}@{} (depends on '{}')", name, c.version, decl.spec),
          None => format!("{} (depends on '{}')", name, decl.spec),
        };
        let dep_name = reqs.add(repo, &decl.spec, &origin, Some(&name))?;
        let types = reqs.edges.entry(name.clone()).or_default();
        let merged = match types.get(&dep_name) {
          Some(existing) => existing.merged(&decl.types),
          None => decl.types.clone(),
        };
        types.insert(dep_name.clone(), merged);
        queue.push_back(dep_name);
      }
    }

    Ok(reqs)
  }

  /// Records the constraints `spec` places on its package and returns the
  /// package name.
  fn add(
    &mut self,
    repo: &RepoPath,
    spec: &AbstractSpec,
    origin: &str,
    imposed_by: Option<&str>,
  ) -> Result<String, SolveError> {
    let Some(name) = spec.name() else {
      return Err(SolveError::UnnamedSpec(spec.to_string()));
    };

    let pc = match self.packages.entry(name.to_string()) {
      Entry::Occupied(entry) => entry.into_mut(),
      Entry::Vacant(entry) => {
        let def = repo.get(spec).map_err(|e| match e {
          RepoError::UnknownPackage(package) => SolveError::UnknownPackage {
            package,
            origin: origin.to_string(),
          },
          other => SolveError::Repo(other),
        })?;
        entry.insert(PackageConstraints::new(def.clone()))
      }
    };

    if let Some(ns) = spec.namespace()
      && ns != pc.def.namespace
    {
      return Err(SolveError::Unsatisfiable {
        package: name.to_string(),
        reason: format!(
          "{} asks for namespace '{}' but '{}' is already taken from '{}'",
          origin, ns, name, pc.def.namespace
        ),
      });
    }

    let variants = spec
      .normalized_variants(&pc.def)
      .map_err(|source| SolveError::UnknownVariant {
        origin: origin.to_string(),
        source,
      })?;

    if !spec.versions().is_any() {
      pc.versions.push(Sourced::new(spec.versions().clone(), origin, imposed_by));
    }
    for (variant, value) in variants {
      pc.variants
        .entry(variant)
        .or_default()
        .push(Sourced::new(value, origin, imposed_by));
    }
    if let Some(compiler) = spec.compiler() {
      pc.compilers.push(Sourced::new(compiler.clone(), origin, imposed_by));
    }
    if let Some(target) = spec.target() {
      pc.targets.push(Sourced::new(target.to_string(), origin, imposed_by));
    }

    Ok(name.to_string())
  }
}
