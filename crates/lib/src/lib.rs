//! spackle-lib: dependency resolution and build orchestration
//!
//! - `spec`: versions, variants, abstract and concrete specs
//! - `repo`: package recipes and repository lookup
//! - `solve`: abstract requests to a consistent concretization graph
//! - `graph`: the concretized DAG and its lockfile form
//! - `build`: concurrent, dependency-ordered builds of a graph
//! - `store`: content-addressed artifact cache
//! - `db`, `install`: what is installed, and how it got there
//! - `env`, `checkout`, `config`: environments, git checkouts, user settings

pub mod build;
pub mod checkout;
pub mod config;
pub mod consts;
pub mod db;
pub mod env;
pub mod graph;
pub mod install;
pub mod platform;
pub mod repo;
pub mod solve;
pub mod spec;
pub mod store;
pub mod root_lock;
pub mod util;
