//! A library for bundling the license texts of C and C++ projects.
//!
//! Given a project's own license and the packages its package manager
//! installed, this library writes one distribution file holding every
//! license text, grouped per package and ordered by package name.
//!
//! The library uses a licbundle.toml manifest and, optionally, the JSON graph
//! printed by `conan graph info --format=json` to find the packages.
//!

/// Contains the license aggregation routine
pub mod aggregator;
/// Contains code that handles various CLI commands
pub mod commands;
/// Error types
pub mod error;
/// Imports Conan dependency graphs
pub mod graph;
/// Contains hashing related functions
pub mod hasher;
/// Contains manifest parsing related functions
pub mod parser;
/// Contains logger
pub mod utils;

#[macro_use]
extern crate lazy_static;

pub use aggregator::{aggregate, render};
pub use error::{AggregateError, CommandError, ConfigError};
pub use parser::{Dependency, ProjectIdentity};
