//! Bottom-up instantiation of concrete specs from solver choices.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{ConcretizationGraph, GraphError};
use crate::solve::Resolution;
use crate::spec::{ConcreteSpec, DepEdge};
use crate::util::hash::SpecHash;

impl ConcretizationGraph {
  /// Hashes every chosen package after its dependencies, so each hash covers
  /// the hashes below it.
  pub(crate) fn from_resolution(res: &Resolution) -> Result<Self, GraphError> {
    let mut remaining: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for name in res.choices.keys() {
      let deps = res.edges.get(name);
      remaining.insert(name.as_str(), deps.map(BTreeMap::len).unwrap_or(0));
      for dep in deps.into_iter().flat_map(BTreeMap::keys) {
        dependents.entry(dep.as_str()).or_default().push(name.as_str());
      }
    }

    let mut ready: BTreeSet<&str> = remaining.iter().filter(|(_, n)| **n == 0).map(|(name, _)| *name).collect();
    let mut hashes: BTreeMap<&str, SpecHash> = BTreeMap::new();
    let mut specs = Vec::with_capacity(res.choices.len());

    while let Some(name) = ready.pop_first() {
      let Some(choice) = res.choices.get(name) else { continue };

      let mut edges = Vec::new();
      for (dep, types) in res.edges.get(name).into_iter().flatten() {
        let Some(hash) = hashes.get(dep.as_str()) else {
          return Err(GraphError::CycleDetected);
        };
        edges.push(DepEdge {
          name: dep.clone(),
          hash: hash.clone(),
          types: types.clone(),
        });
      }

      let spec = ConcreteSpec::new(
        choice.name.clone(),
        choice.namespace.clone(),
        choice.version.clone(),
        choice.variants.clone(),
        choice.compiler.clone(),
        choice.target.clone(),
        edges,
      )?;
      debug!(name = %spec.name(), hash = %spec.hash(), "concretized node");
      hashes.insert(name, spec.hash().clone());
      specs.push(spec);

      for dependent in dependents.get(name).into_iter().flatten() {
        if let Some(count) = remaining.get_mut(dependent) {
          *count = count.saturating_sub(1);
          if *count == 0 {
            ready.insert(*dependent);
          }
        }
      }
    }

    if specs.len() != res.choices.len() {
      return Err(GraphError::CycleDetected);
    }

    let roots = res.roots.iter().filter_map(|n| hashes.get(n.as_str()).cloned()).collect();
    ConcretizationGraph::from_specs(roots, specs)
  }
}
