//! Automate: declarative providers and recipes, built into a local registry.
//!
//! Packages are described by `Automate.yaml`. Building a package (and its
//! dependencies, depth-first) writes runnable modules into the cache and a
//! record into the registry; running one loads the module as a provider and
//! dispatches a command to it.

pub mod cli;
pub mod core;
pub mod error;
pub mod logging;
pub mod provider;
pub mod transport;
