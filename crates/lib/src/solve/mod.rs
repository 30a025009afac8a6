//! Concretization: abstract requests to one consistent configuration per
//! package.
//!
//! The solver works in rounds. Each round walks the dependency declarations
//! that are active under the previous round's choices, gathers every
//! constraint per package, and decides each package again. When a round
//! changes nothing the result is final, and only then do unmet constraints
//! count. Because there is exactly one choice per package name, compatible
//! requests from different parts of the graph always share a node.
//!
//! If the final round still fails, the versions chosen for the packages that
//! imposed the failing constraints are ruled out one at a time and the rounds
//! run again, breadth-first and within a fixed number of attempts. The error
//! reported is the one from the first attempt.

mod choose;
mod constraints;
mod cycle;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use thiserror::Error;
use tracing::{debug, info};

pub(crate) use choose::Choice;

use crate::graph::{ConcretizationGraph, GraphError};
use crate::platform::default_target;
use crate::repo::{RepoError, RepoPath};
use crate::spec::{AbstractSpec, Compiler, ConcreteSpec, DepTypes, VariantError, Version};
use choose::{Context, Failure};
use constraints::Requirements;

#[derive(Debug, Error)]
pub enum SolveError {
  #[error("spec '{0}' does not name a package")]
  UnnamedSpec(String),

  #[error("unknown package '{package}' (required by {origin})")]
  UnknownPackage { package: String, origin: String },

  #[error("{origin}: {source}")]
  UnknownVariant {
    origin: String,
    #[source]
    source: VariantError,
  },

  #[error("cannot satisfy '{package}': {reason}")]
  Unsatisfiable { package: String, reason: String },

  #[error("cyclic dependency: {}", cycle.join(" -> "))]
  CyclicDependency { cycle: Vec<String> },

  #[error("no compilers configured")]
  NoCompilers,

  #[error(transparent)]
  Repo(#[from] RepoError),

  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// Solver inputs besides the requests and the repositories.
#[derive(Debug, Clone)]
pub struct SolveOptions {
  /// Available compilers, in preference order. The first one is the default.
  pub compilers: Vec<Compiler>,
  /// Target for packages that do not request one; the host triple if unset.
  pub target: Option<String>,
  /// Prefer versions that are already installed.
  pub reuse: bool,
  /// Installed specs, consulted when `reuse` is set.
  pub installed: Vec<ConcreteSpec>,
}

impl Default for SolveOptions {
  fn default() -> Self {
    SolveOptions {
      compilers: vec![Compiler::system()],
      target: None,
      reuse: false,
      installed: Vec::new(),
    }
  }
}

/// Final per-package decisions and the active edges between them.
#[derive(Debug, Clone)]
pub(crate) struct Resolution {
  pub roots: Vec<String>,
  pub choices: BTreeMap<String, Choice>,
  /// depender -> dependency -> types
  pub edges: BTreeMap<String, BTreeMap<String, DepTypes>>,
}

/// Concretizes `roots` against `repo`.
///
/// Either every constraint holds in the returned graph or an error names the
/// constraints that could not be met. No partial graph is returned.
pub fn solve(roots: &[AbstractSpec], repo: &RepoPath, options: &SolveOptions) -> Result<ConcretizationGraph, SolveError> {
  let resolution = resolve(roots, repo, options)?;
  Ok(ConcretizationGraph::from_resolution(&resolution)?)
}

pub(crate) fn resolve(roots: &[AbstractSpec], repo: &RepoPath, options: &SolveOptions) -> Result<Resolution, SolveError> {
  let mut root_names = Vec::new();
  for root in roots {
    let Some(name) = root.name() else {
      return Err(SolveError::UnnamedSpec(root.to_string()));
    };
    if !root_names.iter().any(|n| n == name) {
      root_names.push(name.to_string());
    }
  }
  let Some(first_root) = root_names.first().cloned() else {
    return Ok(Resolution {
      roots: Vec::new(),
      choices: BTreeMap::new(),
      edges: BTreeMap::new(),
    });
  };
  let Some(first_compiler) = options.compilers.first() else {
    return Err(SolveError::NoCompilers);
  };

  cycle::check_cycles(roots, repo)?;

  let search = Search {
    roots,
    repo,
    options,
    root_names,
    first_root,
    first_compiler,
    target: options.target.clone().unwrap_or_else(default_target),
    installed: options.reuse.then(|| installed_versions(&options.installed)),
    // A choice settles once everything above it has; the longest chain of
    // declarations bounds the number of rounds.
    max_rounds: repo.len() * 2 + 4,
  };

  // Breadth-first over sets of ruled-out versions, so solutions that give
  // up the fewest preferred versions come first.
  let mut queue = VecDeque::from([Exclusions::new()]);
  let mut tried = BTreeSet::new();
  let mut first_error = None;
  while let Some(excluded) = queue.pop_front() {
    if !tried.insert(excluded.clone()) {
      continue;
    }
    if tried.len() > MAX_ATTEMPTS {
      debug!(attempts = MAX_ATTEMPTS, "giving up search");
      break;
    }

    let (failure, choices) = match search.attempt(&excluded)? {
      Outcome::Solved(resolution) => {
        if tried.len() > 1 {
          info!(attempts = tried.len(), "concretized after ruling out versions");
        }
        return Ok(resolution);
      }
      Outcome::Failed { failure, choices } => (failure, choices),
    };
    debug!(attempt = tried.len(), error = %failure.error, "attempt failed");

    for package in &failure.blame {
      if let Some(choice) = choices.get(package) {
        let mut next = excluded.clone();
        next.entry(package.clone()).or_default().insert(choice.version.clone());
        queue.push_back(next);
      }
    }
    // the unconstrained attempt explains the failure best
    first_error.get_or_insert(failure.error);
  }

  Err(first_error.unwrap_or_else(|| SolveError::Unsatisfiable {
    package: search.first_root.clone(),
    reason: "no candidate configuration left to try".to_string(),
  }))
}

/// Upper bound on search attempts, the first one included.
const MAX_ATTEMPTS: usize = 64;

/// Versions ruled out for one search attempt, per package.
type Exclusions = BTreeMap<String, BTreeSet<Version>>;

enum Outcome {
  Solved(Resolution),
  /// The rounds settled, or ran out, with constraints left unmet.
  Failed {
    failure: Failure,
    choices: BTreeMap<String, Choice>,
  },
}

/// The first error, blaming everything any of the failures blames.
fn merge(failures: Vec<Failure>) -> Option<Failure> {
  let mut failures = failures.into_iter();
  let mut merged = failures.next()?;
  for failure in failures {
    merged.blame.extend(failure.blame);
  }
  Some(merged)
}

struct Search<'a> {
  roots: &'a [AbstractSpec],
  repo: &'a RepoPath,
  options: &'a SolveOptions,
  root_names: Vec<String>,
  first_root: String,
  first_compiler: &'a Compiler,
  target: String,
  installed: Option<BTreeMap<String, BTreeSet<Version>>>,
  max_rounds: usize,
}

impl Search<'_> {
  /// Runs rounds to a fixed point with `excluded` ruled out.
  ///
  /// A round's failures only count once the choices stop changing: they may
  /// come from constraints that an out-of-date choice switched on, and a
  /// package that fails keeps its previous choice meanwhile.
  fn attempt(&self, excluded: &Exclusions) -> Result<Outcome, SolveError> {
    let mut choices: BTreeMap<String, Choice> = BTreeMap::new();
    let mut pending = Vec::new();

    for round in 1..=self.max_rounds {
      let reqs = Requirements::collect(self.roots, self.repo, &choices)?;

      let default_compiler = reqs
        .packages
        .get(&self.first_root)
        .and_then(|pc| choose::choose_compiler(&self.first_root, pc, &self.options.compilers, self.first_compiler).ok())
        .unwrap_or_else(|| self.first_compiler.clone());
      let ctx = Context {
        compilers: &self.options.compilers,
        default_compiler: &default_compiler,
        target: &self.target,
        installed: self.installed.as_ref(),
        excluded,
      };

      let mut next = BTreeMap::new();
      let mut failures = Vec::new();
      for (name, pc) in reqs.packages.iter().filter(|(n, _)| reqs.reachable.contains(*n)) {
        match choose::choose(name, pc, &ctx) {
          Ok(choice) => {
            next.insert(name.clone(), choice);
          }
          Err(failure) => {
            if let Some(previous) = choices.get(name) {
              next.insert(name.clone(), previous.clone());
            }
            failures.push(failure);
          }
        }
      }
      debug!(round, packages = next.len(), failures = failures.len(), "solver round");

      if next != choices {
        choices = next;
        pending = failures;
        continue;
      }

      let conflicts = choices
        .iter()
        .filter_map(|(name, choice)| reqs.packages.get(name).and_then(|pc| choose::check_conflicts(choice, pc).err()));
      failures.extend(conflicts);
      if let Some(failure) = merge(failures) {
        return Ok(Outcome::Failed { failure, choices });
      }

      check_dependency_constraints(self.roots, &reqs.edges)?;
      info!(packages = choices.len(), rounds = round, "concretized");
      return Ok(Outcome::Solved(Resolution {
        roots: self.root_names.clone(),
        choices,
        edges: reqs.edges,
      }));
    }

    let failure = merge(pending).unwrap_or_else(|| {
      Failure::unblamed(SolveError::Unsatisfiable {
        package: self.first_root.clone(),
        reason: format!("choices did not settle after {} rounds", self.max_rounds),
      })
    });
    Ok(Outcome::Failed { failure, choices })
  }
}

fn installed_versions(installed: &[ConcreteSpec]) -> BTreeMap<String, BTreeSet<Version>> {
  let mut out: BTreeMap<String, BTreeSet<Version>> = BTreeMap::new();
  for spec in installed {
    out.entry(spec.name().to_string()).or_default().insert(spec.version().clone());
  }
  out
}

/// Every `^dep` on a root must name something in that root's dependency tree.
fn check_dependency_constraints(
  roots: &[AbstractSpec],
  edges: &BTreeMap<String, BTreeMap<String, DepTypes>>,
) -> Result<(), SolveError> {
  for root in roots {
    let Some(root_name) = root.name() else { continue };
    if root.dependencies().is_empty() {
      continue;
    }

    let mut below = BTreeSet::new();
    let mut stack = vec![root_name.to_string()];
    while let Some(name) = stack.pop() {
      for dep in edges.get(&name).into_iter().flat_map(|d| d.keys()) {
        if below.insert(dep.clone()) {
          stack.push(dep.clone());
        }
      }
    }

    for dep in root.dependencies() {
      if let Some(dep_name) = dep.name()
        && !below.contains(dep_name)
      {
        return Err(SolveError::Unsatisfiable {
          package: dep_name.to_string(),
          reason: format!("'^{}' is not a dependency of '{}'", dep, root_name),
        });
      }
    }
  }
  Ok(())
}
