//! Error types shared across the crate.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a license bundle generation.
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("could not read root license file {path}: {source}")]
    RootLicense {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write license bundle {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write license bundle: {0}")]
    Stream(#[from] std::io::Error),

    #[error("refusing to use {path} as output: {reason}")]
    InvalidOutput { path: PathBuf, reason: &'static str },

    #[error("dependency '{0}' is listed more than once")]
    DuplicateDependency(String),
}

/// Problems with the manifest or an imported dependency graph.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("missing field '{0}'")]
    MissingField(String),

    #[error("field '{field}' must be {expected}")]
    InvalidField { field: String, expected: &'static str },

    #[error("{0}")]
    Invalid(String),
}

/// Top-level error returned by command handlers.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
