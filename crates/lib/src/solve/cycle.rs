//! Cycle detection over declared dependencies, before any search.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::SolveError;
use crate::repo::RepoPath;
use crate::spec::AbstractSpec;

/// Walks every dependency declaration reachable from the roots, ignoring
/// `when` conditions, and fails on the first cycle found.
///
/// Unknown packages are skipped here; the constraint pass reports them with
/// their origin.
pub(super) fn check_cycles(roots: &[AbstractSpec], repo: &RepoPath) -> Result<(), SolveError> {
  let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
  let mut queue: VecDeque<String> = roots.iter().filter_map(|r| r.name().map(String::from)).collect();

  while let Some(name) = queue.pop_front() {
    if adjacency.contains_key(&name) {
      continue;
    }
    let deps: BTreeSet<String> = repo
      .lookup(&name)
      .map(|def| {
        def
          .dependencies
          .iter()
          .filter_map(|d| d.spec.name().map(String::from))
          .collect()
      })
      .unwrap_or_default();
    queue.extend(deps.iter().cloned());
    adjacency.insert(name, deps);
  }

  let mut graph: DiGraph<&str, ()> = DiGraph::new();
  let mut index: HashMap<&str, NodeIndex> = HashMap::new();
  for name in adjacency.keys() {
    index.insert(name.as_str(), graph.add_node(name.as_str()));
  }
  for (name, deps) in &adjacency {
    for dep in deps {
      if let (Some(&from), Some(&to)) = (index.get(name.as_str()), index.get(dep.as_str())) {
        graph.add_edge(from, to, ());
      }
    }
  }

  match toposort(&graph, None) {
    Ok(_) => Ok(()),
    Err(cycle) => Err(SolveError::CyclicDependency {
      cycle: rotate_to_smallest(trace_cycle(&graph, cycle.node_id())),
    }),
  }
}

/// Starts a closed path at its smallest name so reports do not depend on
/// where the search happened to enter the cycle.
fn rotate_to_smallest(mut path: Vec<String>) -> Vec<String> {
  if path.len() < 2 {
    return path;
  }
  path.pop();
  if let Some(min) = path.iter().enumerate().min_by(|a, b| a.1.cmp(b.1)).map(|(i, _)| i) {
    path.rotate_left(min);
  }
  if let Some(first) = path.first().cloned() {
    path.push(first);
  }
  path
}

/// Shortest path from `start` back to itself, as package names.
fn trace_cycle(graph: &DiGraph<&str, ()>, start: NodeIndex) -> Vec<String> {
  let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
  let mut queue = VecDeque::from([start]);

  while let Some(node) = queue.pop_front() {
    let mut successors: Vec<NodeIndex> = graph.neighbors(node).collect();
    successors.sort_by_key(|n| graph[*n]);
    for next in successors {
      if next == start {
        let mut back = Vec::new();
        let mut cur = node;
        while cur != start {
          back.push(graph[cur].to_string());
          cur = parent[&cur];
        }
        back.reverse();
        let mut path = vec![graph[start].to_string()];
        path.extend(back);
        path.push(graph[start].to_string());
        return path;
      }
      if let Entry::Vacant(e) = parent.entry(next) {
        e.insert(node);
        queue.push_back(next);
      }
    }
  }

  vec![graph[start].to_string()]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rotation_is_canonical() {
    let path = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    assert_eq!(rotate_to_smallest(path(&["c", "a", "b", "c"])), path(&["a", "b", "c", "a"]));
    assert_eq!(rotate_to_smallest(path(&["x", "x"])), path(&["x", "x"]));
  }
}
