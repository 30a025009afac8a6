//! `spackle install` and `spackle find` integration tests.
//!
//! These run real recipe phases through `/bin/sh`.

use std::path::PathBuf;

use predicates::prelude::*;

use super::common::TestEnv;

fn installed_prefix(env: &TestEnv, name: &str) -> PathBuf {
  let found = env.json(&["find"]);
  let record = found
    .as_array()
    .unwrap()
    .iter()
    .find(|r| r["name"] == name)
    .unwrap_or_else(|| panic!("{} is not installed", name));
  PathBuf::from(record["prefix"].as_str().unwrap())
}

#[test]
fn install_builds_dependencies_first() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["install", "greet"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Install complete"))
    .stdout(predicate::str::contains("Built: 2"));

  let greet = installed_prefix(&env, "greet");
  assert!(greet.starts_with(env.root_path().join("opt")));
  let greeting = std::fs::read_to_string(greet.join("share/greeting.txt")).unwrap();
  assert_eq!(greeting.trim(), "hello from libmsg@2.1 lang=en");
  assert!(greet.join(".spackle/spec.json").is_file());
  assert!(greet.join(".spackle/build.log").is_file());
}

#[test]
fn reinstall_is_served_from_cache() {
  let env = TestEnv::new();
  env.spackle_cmd().args(["install", "greet"]).assert().success();

  let summary = env.json(&["install", "greet"]);
  let records = summary["records"].as_object().unwrap();
  assert_eq!(records.len(), 2);
  for record in records.values() {
    assert_eq!(record["status"], "built");
    assert_eq!(record["origin"], "cached");
  }
}

#[test]
fn fresh_root_reuses_artifact_cache() {
  let env = TestEnv::new();
  env.spackle_cmd().args(["install", "libmsg"]).assert().success();
  std::fs::remove_dir_all(env.root_path()).unwrap();

  env
    .spackle_cmd()
    .args(["install", "libmsg"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Cached: 1"));
  let libmsg = installed_prefix(&env, "libmsg");
  assert!(libmsg.join("share/msg.txt").is_file());
}

#[test]
fn variants_reach_the_build() {
  let env = TestEnv::new();
  env.spackle_cmd().args(["install", "libmsg", "lang=fr"]).assert().success();
  let libmsg = installed_prefix(&env, "libmsg");
  let msg = std::fs::read_to_string(libmsg.join("share/msg.txt")).unwrap();
  assert!(msg.contains("lang=fr"), "{}", msg);
}

#[test]
fn failure_skips_dependents_and_exits_nonzero() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["install", "tool", "libmsg"])
    .assert()
    .failure()
    .stdout(predicate::str::contains("Built: 1"))
    .stdout(predicate::str::contains("Failed: 1"))
    .stdout(predicate::str::contains("Skipped: 1"))
    .stdout(predicate::str::contains("build.log"))
    .stderr(predicate::str::contains("1 package(s) failed to build, 1 skipped"));

  // The independent root still got recorded
  let found = env.json(&["find"]);
  let names: Vec<&str> = found.as_array().unwrap().iter().map(|r| r["name"].as_str().unwrap()).collect();
  assert_eq!(names, vec!["libmsg"]);
}

#[test]
fn find_marks_dependencies() {
  let env = TestEnv::new();
  env.spackle_cmd().args(["install", "greet"]).assert().success();

  env
    .spackle_cmd()
    .arg("find")
    .assert()
    .success()
    .stdout(predicate::str::contains("2 installed package(s)"))
    .stdout(predicate::str::contains("greet@1.0\n"))
    .stdout(predicate::str::contains("libmsg@2.1 (dependency)"));

  env
    .spackle_cmd()
    .args(["find", "--long", "libmsg"])
    .assert()
    .success()
    .stdout(predicate::str::contains("gen 1"))
    .stdout(predicate::str::contains(env.root_path().join("opt").display().to_string()));
}

#[test]
fn find_reports_missing_prefixes() {
  let env = TestEnv::new();
  env.spackle_cmd().args(["install", "libmsg"]).assert().success();
  std::fs::remove_dir_all(installed_prefix(&env, "libmsg")).unwrap();

  env
    .spackle_cmd()
    .arg("find")
    .assert()
    .success()
    .stderr(predicate::str::contains("is missing"));
}

#[test]
fn install_into_environment_records_specs_and_lockfile() {
  let env = TestEnv::new();
  env.spackle_cmd().args(["env", "create", "dev"]).assert().success();
  env.spackle_cmd().args(["install", "-e", "dev", "greet"]).assert().success();

  let env_dir = env.root_path().join("environments/dev");
  let descriptor = std::fs::read_to_string(env_dir.join("spackle.json")).unwrap();
  assert!(descriptor.contains("greet"), "{}", descriptor);
  assert!(env_dir.join("spackle.lock").is_file());

  // With no specs, the environment's own specs are installed
  env
    .spackle_cmd()
    .args(["install", "-e", "dev"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Cached: 2"));
}

#[test]
fn install_without_specs_fails() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .arg("install")
    .assert()
    .failure()
    .stderr(predicate::str::contains("nothing to install"));
}

#[test]
fn reuse_keeps_installed_version() {
  let env = TestEnv::new();
  env.spackle_cmd().args(["install", "libmsg@2.0"]).assert().success();

  let summary = env.json(&["install", "--reuse", "greet"]);
  let records = summary["records"].as_object().unwrap();
  let libmsg = records.values().find(|r| r["name"] == "libmsg").unwrap();
  assert_eq!(libmsg["origin"], "cached");
}

#[test]
fn jobs_flag_is_accepted() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["install", "-j", "1", "greet"])
    .assert()
    .success();
}
