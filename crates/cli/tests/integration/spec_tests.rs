//! `spackle spec` integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

fn spec_json(env: &TestEnv, specs: &[&str]) -> serde_json::Value {
  let output = env.spackle_cmd().arg("spec").args(specs).arg("--json").output().unwrap();
  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
  serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn spec_json_lists_every_node_once() {
  let env = TestEnv::new();
  let lock = spec_json(&env, &["greet"]);

  assert_eq!(lock["version"], 1);
  assert_eq!(lock["roots"].as_array().unwrap().len(), 1);
  let specs = lock["specs"].as_object().unwrap();
  assert_eq!(specs.len(), 2);

  let libmsg = specs.values().find(|s| s["name"] == "libmsg").unwrap();
  assert_eq!(libmsg["version"], "2.1");
  assert_eq!(libmsg["variants"]["lang"], "en");
  assert_eq!(libmsg["target"], "x86_64-linux");
}

#[test]
fn spec_is_deterministic_across_runs() {
  let env = TestEnv::new();
  let first = spec_json(&env, &["greet", "^libmsg~shared"]);
  let second = spec_json(&env, &["greet", "^libmsg~shared"]);
  assert_eq!(first, second);
}

#[test]
fn spec_honors_variant_requests() {
  let env = TestEnv::new();
  let lock = spec_json(&env, &["libmsg", "lang=fr"]);
  let specs = lock["specs"].as_object().unwrap();
  let libmsg = specs.values().next().unwrap();
  assert_eq!(libmsg["variants"]["lang"], "fr");
}

#[test]
fn spec_writes_lockfile() {
  let env = TestEnv::new();
  let lock_path = env.path().join("greet.lock");

  env
    .spackle_cmd()
    .args(["spec", "greet", "--lock"])
    .arg(&lock_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("Wrote"));

  let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&lock_path).unwrap()).unwrap();
  assert_eq!(written, spec_json(&env, &["greet"]));
}

#[test]
fn conflicting_version_requests_are_unsatisfiable() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["spec", "greet", "pinned"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("cannot satisfy 'libmsg'"));
}

#[test]
fn unknown_package_is_reported() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["spec", "nosuchpkg"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown package 'nosuchpkg'"));
}

#[test]
fn invalid_variant_value_is_reported() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["spec", "libmsg", "lang=de"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("lang"));
}
