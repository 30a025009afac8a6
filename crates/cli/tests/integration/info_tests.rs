//! `spackle info` integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn info_shows_recipe_details() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["info", "greet"])
    .assert()
    .success()
    .stdout(predicate::str::contains("builtin.greet"))
    .stdout(predicate::str::contains("1.0 [preferred]"))
    .stdout(predicate::str::contains("libmsg@2.0:"))
    .stdout(predicate::str::contains("https://example.org/greet"));
}

#[test]
fn info_lists_variants() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["info", "libmsg"])
    .assert()
    .success()
    .stdout(predicate::str::contains("lang [default: en] (en, fr)"))
    .stdout(predicate::str::contains("Build shared libraries"));
}

#[test]
fn info_json_is_the_recipe() {
  let env = TestEnv::new();
  let recipe = env.json(&["info", "libmsg"]);
  assert_eq!(recipe["name"], "libmsg");
  assert_eq!(recipe["namespace"], "builtin");
  assert_eq!(recipe["versions"].as_array().unwrap().len(), 3);
}

#[test]
fn info_unknown_package_fails() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["info", "nosuchpkg"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("No package named 'nosuchpkg'"));
}
