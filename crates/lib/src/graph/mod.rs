//! The concretized DAG.
//!
//! Nodes are [`ConcreteSpec`]s keyed by hash. Edges run from a dependency to
//! its dependent, so a topological walk visits dependencies first. The
//! concrete specs' own dependency lists are the source of truth; the
//! petgraph edges mirror them for ordering and traversal.

mod builder;
pub mod lockfile;

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::spec::{AbstractSpec, ConcreteSpec, DepTypes};
use crate::util::hash::{HashError, SpecHash};

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("dependency cycle in concretized graph")]
  CycleDetected,

  #[error("two nodes share hash {0}")]
  DuplicateHash(SpecHash),

  #[error("{dependent} depends on {dependency}, which is not in the graph")]
  MissingDependency { dependent: String, dependency: SpecHash },

  #[error("stored hash {0} does not match the spec's contents")]
  HashMismatch(SpecHash),

  #[error("root {0} is not in the graph")]
  MissingRoot(SpecHash),

  #[error("failed to hash spec: {0}")]
  Hash(#[from] HashError),
}

#[derive(Debug, Clone, Default)]
pub struct ConcretizationGraph {
  graph: DiGraph<ConcreteSpec, DepTypes>,
  nodes: BTreeMap<SpecHash, NodeIndex>,
  roots: Vec<SpecHash>,
}

impl ConcretizationGraph {
  /// Assembles a graph from already hashed specs and checks every invariant.
  pub fn from_specs(roots: Vec<SpecHash>, specs: impl IntoIterator<Item = ConcreteSpec>) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut nodes = BTreeMap::new();

    for spec in specs {
      let hash = spec.hash().clone();
      if nodes.contains_key(&hash) {
        return Err(GraphError::DuplicateHash(hash));
      }
      nodes.insert(hash, graph.add_node(spec));
    }

    let mut edges = Vec::new();
    for &idx in nodes.values() {
      let spec: &ConcreteSpec = &graph[idx];
      for dep in spec.dependencies() {
        let Some(&dep_idx) = nodes.get(&dep.hash) else {
          return Err(GraphError::MissingDependency {
            dependent: spec.to_string(),
            dependency: dep.hash.clone(),
          });
        };
        edges.push((dep_idx, idx, dep.types.clone()));
      }
    }
    for (from, to, types) in edges {
      graph.add_edge(from, to, types);
    }

    for root in &roots {
      if !nodes.contains_key(root) {
        return Err(GraphError::MissingRoot(root.clone()));
      }
    }

    let built = ConcretizationGraph { graph, nodes, roots };
    built.validate()?;
    Ok(built)
  }

  /// Checks the graph invariants: acyclic, edge targets present and named
  /// as declared, every hash recomputable.
  pub fn validate(&self) -> Result<(), GraphError> {
    toposort(&self.graph, None).map_err(|_| GraphError::CycleDetected)?;
    for (hash, &idx) in &self.nodes {
      let spec = &self.graph[idx];
      if spec.hash() != hash || !spec.verify_hash() {
        return Err(GraphError::HashMismatch(hash.clone()));
      }
      for dep in spec.dependencies() {
        let present = self.get(&dep.hash).is_some_and(|d| d.name() == dep.name);
        if !present {
          return Err(GraphError::MissingDependency {
            dependent: spec.to_string(),
            dependency: dep.hash.clone(),
          });
        }
      }
    }
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn get(&self, hash: &SpecHash) -> Option<&ConcreteSpec> {
    self.nodes.get(hash).map(|&idx| &self.graph[idx])
  }

  pub fn contains(&self, hash: &SpecHash) -> bool {
    self.nodes.contains_key(hash)
  }

  /// The node for a package name. Names are unique within a solve.
  pub fn by_name(&self, name: &str) -> Option<&ConcreteSpec> {
    self.specs().find(|s| s.name() == name)
  }

  /// All nodes, ordered by hash.
  pub fn specs(&self) -> impl Iterator<Item = &ConcreteSpec> {
    self.nodes.values().map(|&idx| &self.graph[idx])
  }

  pub fn hashes(&self) -> impl Iterator<Item = &SpecHash> {
    self.nodes.keys()
  }

  pub fn root_hashes(&self) -> &[SpecHash] {
    &self.roots
  }

  pub fn roots(&self) -> Vec<&ConcreteSpec> {
    self.roots.iter().filter_map(|h| self.get(h)).collect()
  }

  /// Direct dependencies, in edge (name) order.
  pub fn dependencies(&self, hash: &SpecHash) -> Vec<&ConcreteSpec> {
    self
      .get(hash)
      .map(|spec| spec.dependencies().iter().filter_map(|d| self.get(&d.hash)).collect())
      .unwrap_or_default()
  }

  /// Direct dependents, ordered by hash.
  pub fn dependents(&self, hash: &SpecHash) -> Vec<&ConcreteSpec> {
    let Some(&idx) = self.nodes.get(hash) else {
      return Vec::new();
    };
    let mut out: Vec<&ConcreteSpec> = self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|n| &self.graph[n])
      .collect();
    out.sort_by(|a, b| a.hash().cmp(b.hash()));
    out.dedup_by(|a, b| a.hash() == b.hash());
    out
  }

  /// Every node reachable below `hash`, excluding itself.
  pub fn transitive_dependencies(&self, hash: &SpecHash) -> Vec<&ConcreteSpec> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![hash.clone()];
    while let Some(current) = stack.pop() {
      for dep in self.dependencies(&current) {
        if seen.insert(dep.hash().clone()) {
          stack.push(dep.hash().clone());
        }
      }
    }
    seen.iter().filter_map(|h| self.get(h)).collect()
  }

  /// Hashes with dependencies before dependents. Ties break by hash so the
  /// order is stable.
  pub fn topological_order(&self) -> Vec<&SpecHash> {
    let mut in_degree: BTreeMap<&SpecHash, usize> = self
      .specs()
      .map(|s| (s.hash(), s.dependencies().len()))
      .collect();
    let mut ready: BTreeSet<&SpecHash> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(h, _)| *h).collect();
    let mut order = Vec::with_capacity(self.len());

    while let Some(hash) = ready.pop_first() {
      order.push(hash);
      for dependent in self.dependents(hash) {
        if let Some(deg) = in_degree.get_mut(dependent.hash()) {
          *deg = deg.saturating_sub(1);
          if *deg == 0 {
            ready.insert(dependent.hash());
          }
        }
      }
    }
    order
  }

  /// Checks a node against a request, including `^dep` constraints, which
  /// must be met by some node below it.
  pub fn satisfies(&self, hash: &SpecHash, spec: &AbstractSpec) -> bool {
    let Some(node) = self.get(hash) else { return false };
    if !node.satisfies(spec) {
      return false;
    }
    if spec.dependencies().is_empty() {
      return true;
    }
    let below = self.transitive_dependencies(hash);
    spec.dependencies().iter().all(|d| below.iter().any(|b| b.satisfies(d)))
  }

  /// Nodes matching a request, ordered by hash.
  pub fn find(&self, spec: &AbstractSpec) -> Vec<&ConcreteSpec> {
    self.specs().filter(|s| self.satisfies(s.hash(), spec)).collect()
  }

  /// Indented tree, one root after another, each node shown once per root.
  ///
  /// ```text
  /// 3f2a9c0  app@1.0 %gcc@12.2.0 target=x86_64-linux
  /// 8b1d77e      ^lib@2.1+shared %gcc@12.2.0 target=x86_64-linux
  /// ```
  pub fn render_tree(&self) -> String {
    let mut out = String::new();
    for root in &self.roots {
      let mut seen = BTreeSet::new();
      self.render_node(root, 0, &mut seen, &mut out);
    }
    out
  }

  fn render_node(&self, hash: &SpecHash, depth: usize, seen: &mut BTreeSet<SpecHash>, out: &mut String) {
    if !seen.insert(hash.clone()) {
      return;
    }
    let Some(spec) = self.get(hash) else { return };
    let caret = if depth == 0 { "" } else { "^" };
    out.push_str(&format!("{}  {}{}{}\n", spec.short_hash(), "    ".repeat(depth), caret, spec));
    for dep in spec.dependencies() {
      self.render_node(&dep.hash, depth + 1, seen, out);
    }
  }
}
