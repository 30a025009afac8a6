//! Library-level tests that drive solve, build and install together.

mod common;

mod build_tests;
mod install_tests;
mod solve_tests;
