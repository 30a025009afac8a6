//! `spackle checkout` integration tests.
//!
//! Git behavior is covered in the library with a fake runner; these only
//! check how the command picks its working tree.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn checkout_in_unknown_environment_fails() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["checkout", "--env", "missing", "main"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("'missing' is not a valid spackle environment"));
}

#[test]
fn checkout_in_unknown_repo_fails() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .args(["checkout", "--repo", "nosuchns", "main"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("'nosuchns' is not a valid spackle repo namespace"));
}

#[test]
fn checkout_outside_a_git_tree_fails() {
  let env = TestEnv::new();
  env
    .spackle_cmd()
    .env("SPACKLE_SOURCE", env.path())
    .args(["checkout", "main"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("git"));
}
