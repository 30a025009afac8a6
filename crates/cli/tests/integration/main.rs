//! End-to-end tests driving the spackle binary against the fixture repository.

mod common;

mod checkout_tests;
mod env_tests;
mod info_tests;
mod spec_tests;

#[cfg(unix)]
mod install_tests;
