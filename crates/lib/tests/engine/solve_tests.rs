//! Concretization properties checked through the public API.

use std::collections::BTreeSet;

use serde_json::json;
use spackle_lib::graph::lockfile::Lockfile;
use spackle_lib::solve::{SolveError, solve};

use super::common::{SUM, depends, options, recipe, repo, specs};

#[test]
fn solving_twice_gives_identical_hashes() {
  let r = repo(vec![
    depends("app", &["1.0"], &["lib", "util"]),
    depends("lib", &["1.0", "2.0"], &["util"]),
    recipe("util", &["0.9", "1.0"]),
  ]);
  let first = solve(&specs("app"), &r, &options()).unwrap();
  let second = solve(&specs("app"), &r, &options()).unwrap();

  let a: BTreeSet<_> = first.hashes().cloned().collect();
  let b: BTreeSet<_> = second.hashes().cloned().collect();
  assert_eq!(a, b);
  assert_eq!(first.root_hashes(), second.root_hashes());
  assert_eq!(a.len(), first.len());
  first.validate().unwrap();
}

#[test]
fn dependency_range_picks_highest_match() {
  let r = repo(vec![depends("app", &["1.0"], &["lib@2.0:"]), recipe("lib", &["1.9", "2.0", "2.1"])]);
  let graph = solve(&specs("app@1.0"), &r, &options()).unwrap();
  assert_eq!(graph.by_name("lib").unwrap().version().to_string(), "2.1");
}

#[test]
fn incompatible_root_versions_are_unsatisfiable() {
  let r = repo(vec![recipe("lib", &["1.0", "2.0"])]);
  let err = solve(&specs("lib@1.0 lib@2.0"), &r, &options()).unwrap_err();
  assert!(matches!(err, SolveError::Unsatisfiable { .. }), "{}", err);
}

#[test]
fn shared_dependency_is_a_single_node() {
  let r = repo(vec![
    depends("a", &["1.0"], &["c"]),
    depends("b", &["1.0"], &["c@1:"]),
    recipe("c", &["0.5", "1.0", "1.1"]),
  ]);
  let graph = solve(&specs("a b"), &r, &options()).unwrap();

  assert_eq!(graph.len(), 3);
  let c = graph.by_name("c").unwrap();
  assert_eq!(c.version().to_string(), "1.1");
  let dependents: BTreeSet<&str> = graph.dependents(c.hash()).iter().map(|s| s.name()).collect();
  assert_eq!(dependents, BTreeSet::from(["a", "b"]));
  for name in ["a", "b"] {
    let edge = &graph.by_name(name).unwrap().dependencies()[0];
    assert_eq!(&edge.hash, c.hash());
  }
}

#[test]
fn cycles_are_rejected_before_search() {
  let r = repo(vec![
    depends("x", &["1.0"], &["y"]),
    depends("y", &["1.0"], &["z"]),
    depends("z", &["1.0"], &["x"]),
  ]);
  let err = solve(&specs("x"), &r, &options()).unwrap_err();
  match err {
    SolveError::CyclicDependency { cycle } => {
      assert!(cycle.contains(&"x".to_string()));
      assert!(cycle.contains(&"z".to_string()));
    }
    other => panic!("expected a cycle, got {}", other),
  }
}

#[test]
fn conditional_dependency_follows_variant() {
  let r = repo(vec![
    json!({
      "name": "curl",
      "versions": [{ "version": "8.0", "sha256": SUM }],
      "variants": [{ "name": "ssl", "default": false }],
      "dependencies": [{ "spec": "openssl", "when": "+ssl" }],
    }),
    recipe("openssl", &["3.0"]),
  ]);
  let without = solve(&specs("curl"), &r, &options()).unwrap();
  assert!(without.by_name("openssl").is_none());

  let with = solve(&specs("curl+ssl"), &r, &options()).unwrap();
  assert!(with.by_name("openssl").is_some());
  with.validate().unwrap();
}

#[test]
fn declared_conflict_carries_its_message() {
  let r = repo(vec![json!({
    "name": "old",
    "versions": [{ "version": "1.0", "sha256": SUM }],
    "conflicts": [{ "spec": "%gcc@12:", "msg": "breaks with modern gcc" }],
  })]);
  let err = solve(&specs("old"), &r, &options()).unwrap_err();
  assert!(err.to_string().contains("breaks with modern gcc"), "{}", err);
}

#[test]
fn caret_constraint_on_unrelated_package_fails() {
  let r = repo(vec![recipe("app", &["1.0"]), recipe("zlib", &["1.3"])]);
  let err = solve(&specs("app ^zlib"), &r, &options()).unwrap_err();
  assert!(err.to_string().contains("not a dependency"), "{}", err);
}

#[test]
fn lockfile_round_trip_preserves_graph() {
  let r = repo(vec![depends("app", &["1.0"], &["lib"]), recipe("lib", &["2.0"])]);
  let graph = solve(&specs("app"), &r, &options()).unwrap();

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("spackle.lock");
  Lockfile::from_graph(&graph).save(&path).unwrap();
  let loaded = Lockfile::load(&path).unwrap().into_graph().unwrap();

  assert_eq!(loaded.root_hashes(), graph.root_hashes());
  assert_eq!(loaded.len(), graph.len());
  assert_eq!(loaded.render_tree(), graph.render_tree());
}

#[test]
fn condition_switched_off_in_a_later_round() {
  // b forces a+v, but only after a first round where a is still ~v and
  // asks for c@1, which clashes with r's c@2:.
  let r = repo(vec![
    depends("r", &["1"], &["a", "b", "c@2:"]),
    json!({
      "name": "a",
      "versions": [{ "version": "1", "sha256": SUM }],
      "variants": [{ "name": "v", "default": false }],
      "dependencies": [{ "spec": "c@1", "when": "~v" }]
    }),
    json!({
      "name": "b",
      "versions": [{ "version": "1", "sha256": SUM }],
      "variants": [{ "name": "x", "default": false }],
      "dependencies": [{ "spec": "a+v", "when": "~x" }]
    }),
    recipe("c", &["1", "2"]),
  ]);

  let graph = solve(&specs("r"), &r, &options()).unwrap();
  assert_eq!(graph.by_name("c").unwrap().version().to_string(), "2");
  let a = graph.by_name("a").unwrap();
  assert!(a.satisfies(&specs("a+v")[0]));
  assert!(a.dependencies().is_empty());
}

#[test]
fn lower_version_when_the_highest_cannot_work() {
  let r = repo(vec![
    depends("app", &["1"], &["lib", "foo@:1"]),
    json!({
      "name": "lib",
      "versions": [{ "version": "1", "sha256": SUM }, { "version": "2", "sha256": SUM }],
      "dependencies": [{ "spec": "foo@2:", "when": "@2:" }]
    }),
    recipe("foo", &["1", "2"]),
  ]);

  let graph = solve(&specs("app"), &r, &options()).unwrap();
  assert_eq!(graph.by_name("lib").unwrap().version().to_string(), "1");
  assert_eq!(graph.by_name("foo").unwrap().version().to_string(), "1");
  graph.validate().unwrap();

  // an explicit request for lib@2 leaves nothing to fall back to
  let err = solve(&specs("app ^lib@2"), &r, &options()).unwrap_err();
  assert!(err.to_string().contains("cannot satisfy 'foo'"), "{}", err);
}

#[test]
fn fallback_gives_up_the_fewest_versions() {
  let mut lib = recipe("lib", &["1", "2", "3", "4"]);
  lib["dependencies"] = json!([{ "spec": "foo@2:", "when": "@4:" }]);
  let r = repo(vec![depends("app", &["1"], &["lib", "foo@:1"]), lib, recipe("foo", &["1", "2"])]);

  let graph = solve(&specs("app"), &r, &options()).unwrap();
  assert_eq!(graph.by_name("lib").unwrap().version().to_string(), "3");
}

#[test]
fn exhausted_candidates_report_the_first_failure() {
  let r = repo(vec![
    depends("app", &["1"], &["lib", "foo@:1"]),
    json!({
      "name": "lib",
      "versions": [{ "version": "1", "sha256": SUM }, { "version": "2", "sha256": SUM }],
      "dependencies": [{ "spec": "foo@2:" }]
    }),
    recipe("foo", &["1", "2"]),
  ]);
  let err = solve(&specs("app"), &r, &options()).unwrap_err();
  let msg = err.to_string();
  assert!(matches!(err, SolveError::Unsatisfiable { .. }));
  assert!(msg.contains("from lib@2"), "{}", msg);
}
