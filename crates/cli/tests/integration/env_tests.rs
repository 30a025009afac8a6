//! `spackle env` integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn created_environments_are_listed() {
  let env = TestEnv::new();
  env.spackle_cmd().args(["env", "create", "dev"]).assert().success();
  env.spackle_cmd().args(["env", "create", "alpha"]).assert().success();

  let names = env.json(&["env", "list"]);
  assert_eq!(names, serde_json::json!(["alpha", "dev"]));
  assert!(env.root_path().join("environments/dev/spackle.json").is_file());
}

#[test]
fn creating_an_existing_environment_fails() {
  let env = TestEnv::new();
  env.spackle_cmd().args(["env", "create", "dev"]).assert().success();
  env
    .spackle_cmd()
    .args(["env", "create", "dev"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("already exists"));
}

#[test]
fn invalid_environment_name_fails() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["env", "create", "../escape"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid environment name"));
}
