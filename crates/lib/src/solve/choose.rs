//! Per-package decisions: version, variants, compiler, target.

use std::collections::{BTreeMap, BTreeSet};

use super::SolveError;
use super::constraints::{PackageConstraints, Sourced};
use crate::repo::VariantDef;
use crate::spec::{Compiler, Config, VariantValue, Version};

/// The configuration picked for one package in a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Choice {
  pub name: String,
  pub namespace: String,
  pub version: Version,
  pub variants: BTreeMap<String, VariantValue>,
  pub compiler: Compiler,
  pub target: String,
}

impl Choice {
  pub fn config(&self) -> Config<'_> {
    Config {
      name: &self.name,
      namespace: &self.namespace,
      version: &self.version,
      variants: &self.variants,
      compiler: &self.compiler,
      target: &self.target,
    }
  }

  pub fn satisfies(&self, spec: &crate::spec::AbstractSpec) -> bool {
    self.config().satisfies(spec)
  }
}

pub(super) struct Context<'a> {
  pub compilers: &'a [Compiler],
  /// Compiler for packages that do not ask for one.
  pub default_compiler: &'a Compiler,
  pub target: &'a str,
  /// Installed versions per package, when reusing.
  pub installed: Option<&'a BTreeMap<String, BTreeSet<Version>>>,
  /// Versions ruled out for this search attempt.
  pub excluded: &'a BTreeMap<String, BTreeSet<Version>>,
}

/// A decision that could not be made, with the packages whose recipes
/// imposed the constraints involved. Another version of one of those may
/// impose something else.
#[derive(Debug)]
pub(super) struct Failure {
  pub error: SolveError,
  pub blame: BTreeSet<String>,
}

impl Failure {
  pub fn unblamed(error: SolveError) -> Self {
    Failure {
      error,
      blame: BTreeSet::new(),
    }
  }

  fn blaming<'a, T: 'a>(error: SolveError, constraints: impl IntoIterator<Item = &'a Sourced<T>>) -> Self {
    Failure {
      error,
      blame: constraints.into_iter().filter_map(|c| c.imposed_by.clone()).collect(),
    }
  }
}

fn unsatisfiable(package: &str, reason: String) -> SolveError {
  SolveError::Unsatisfiable {
    package: package.to_string(),
    reason,
  }
}

fn join<T: std::fmt::Display>(items: &[Sourced<T>]) -> String {
  items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

pub(super) fn choose(name: &str, pc: &PackageConstraints, ctx: &Context<'_>) -> Result<Choice, Failure> {
  let version = choose_version(name, pc, ctx).map_err(|e| Failure::blaming(e, &pc.versions))?;
  let variants = choose_variants(name, pc).map_err(|e| Failure::blaming(e, pc.variants.values().flatten()))?;
  let compiler =
    choose_compiler(name, pc, ctx.compilers, ctx.default_compiler).map_err(|e| Failure::blaming(e, &pc.compilers))?;
  let target = choose_target(name, pc, ctx.target).map_err(|e| Failure::blaming(e, &pc.targets))?;
  Ok(Choice {
    name: name.to_string(),
    namespace: pc.def.namespace.clone(),
    version,
    variants,
    compiler,
    target,
  })
}

/// Every constraint filters the candidates, so a pinned `=x` leaves only `x`.
/// Among the rest: an installed version when reusing, then the highest
/// version if anything constrained the choice, then the recipe's preferred
/// version, then the highest.
fn choose_version(name: &str, pc: &PackageConstraints, ctx: &Context<'_>) -> Result<Version, SolveError> {
  let excluded = ctx.excluded.get(name);
  let matching: Vec<_> = pc
    .def
    .versions_descending()
    .into_iter()
    .filter(|v| excluded.is_none_or(|ex| !ex.contains(&v.version)))
    .filter(|v| pc.versions.iter().all(|c| c.value.satisfied_by(&v.version)))
    .collect();
  let candidates: Vec<_> = matching
    .iter()
    .filter(|v| !v.deprecated || pc.versions.iter().any(|c| c.value.names_exactly(&v.version)))
    .copied()
    .collect();

  let Some(highest) = candidates.first() else {
    return Err(unsatisfiable(name, no_version_reason(pc, !matching.is_empty())));
  };

  if let Some(installed) = ctx.installed.and_then(|m| m.get(name))
    && let Some(reused) = candidates.iter().find(|v| installed.contains(&v.version))
  {
    return Ok(reused.version.clone());
  }

  if !pc.versions.is_empty() {
    return Ok(highest.version.clone());
  }

  Ok(
    candidates
      .iter()
      .find(|v| v.preferred)
      .unwrap_or(highest)
      .version
      .clone(),
  )
}

fn no_version_reason(pc: &PackageConstraints, only_deprecated: bool) -> String {
  if only_deprecated {
    return format!(
      "only deprecated versions satisfy {}; request one exactly to use it",
      join(&pc.versions)
    );
  }
  let declared: Vec<String> = pc.def.versions_descending().iter().map(|v| v.version.to_string()).collect();
  match pc.versions.as_slice() {
    [single] => format!("no declared version satisfies {} (declared: {})", single, declared.join(", ")),
    many => format!(
      "version constraints have no common declared version: {} (declared: {})",
      join(many),
      declared.join(", ")
    ),
  }
}

/// Explicit and recipe-imposed values are both hard: they must agree, and
/// the default only fills in variants nobody constrained. Multi-valued
/// variants take the union of all requests.
fn choose_variants(name: &str, pc: &PackageConstraints) -> Result<BTreeMap<String, VariantValue>, SolveError> {
  let mut out = BTreeMap::new();
  for decl in &pc.def.variants {
    let requests = pc.variants.get(&decl.name).map(Vec::as_slice).unwrap_or_default();
    let value = if requests.is_empty() {
      decl.default_value(&pc.def.name)
    } else if decl.multi {
      VariantValue::Multi(
        requests
          .iter()
          .flat_map(|r| r.value.values())
          .map(String::from)
          .collect(),
      )
    } else {
      single_variant(name, decl, requests)?
    };
    out.insert(decl.name.clone(), value);
  }
  Ok(out)
}

fn single_variant(name: &str, decl: &VariantDef, requests: &[Sourced<VariantValue>]) -> Result<VariantValue, SolveError> {
  // explicit first, so a disagreement names the user's request
  let mut ordered = requests.iter().filter(|r| r.explicit).chain(requests.iter().filter(|r| !r.explicit));
  let Some(first) = ordered.next() else {
    return Ok(decl.default.clone());
  };
  if let Some(other) = ordered.find(|r| r.value != first.value) {
    return Err(unsatisfiable(
      name,
      format!(
        "variant '{}' is requested as {} and as {}",
        decl.name, first, other
      ),
    ));
  }
  Ok(first.value.clone())
}

/// Highest configured compiler meeting every compiler constraint.
pub(super) fn choose_compiler(
  name: &str,
  pc: &PackageConstraints,
  compilers: &[Compiler],
  fallback: &Compiler,
) -> Result<Compiler, SolveError> {
  if pc.compilers.is_empty() {
    return Ok(fallback.clone());
  }
  compilers
    .iter()
    .filter(|c| pc.compilers.iter().all(|want| c.satisfies(&want.value)))
    .fold(None, |best: Option<&Compiler>, c| match best {
      Some(b) if b.version >= c.version => Some(b),
      _ => Some(c),
    })
    .cloned()
    .ok_or_else(|| {
      let configured: Vec<String> = compilers.iter().map(ToString::to_string).collect();
      unsatisfiable(
        name,
        format!(
          "no configured compiler satisfies {} (configured: {})",
          join(&pc.compilers),
          configured.join(", ")
        ),
      )
    })
}

fn choose_target(name: &str, pc: &PackageConstraints, default: &str) -> Result<String, SolveError> {
  let Some((first, rest)) = pc.targets.split_first() else {
    return Ok(default.to_string());
  };
  if let Some(other) = rest.iter().find(|t| t.value != first.value) {
    return Err(unsatisfiable(name, format!("conflicting targets {} and {}", first, other)));
  }
  Ok(first.value.clone())
}

/// Fails if the choice matches one of the recipe's declared conflicts. The
/// package itself is to blame as much as anything that constrained it.
pub(super) fn check_conflicts(choice: &Choice, pc: &PackageConstraints) -> Result<(), Failure> {
  for conflict in &pc.def.conflicts {
    let applies = conflict.when.as_ref().is_none_or(|w| choice.satisfies(w));
    if applies && choice.satisfies(&conflict.spec) {
      let mut reason = format!("{}@{} conflicts with '{}'", choice.name, choice.version, conflict.spec);
      if let Some(when) = &conflict.when {
        reason.push_str(&format!(" when '{}'", when));
      }
      if let Some(msg) = &conflict.msg {
        reason.push_str(": ");
        reason.push_str(msg);
      }
      let mut failure = Failure::blaming(unsatisfiable(&choice.name, reason), &pc.versions);
      failure.blame.extend(pc.variants.values().flatten().filter_map(|c| c.imposed_by.clone()));
      failure.blame.insert(choice.name.clone());
      return Err(failure);
    }
  }
  Ok(())
}
