//! # Chassis Config
//!
//! The declarative configuration document a machine runs from: resource
//! configs (components and services), remotes, modules, managed
//! processes, and scheduled jobs.
//!
//! The document can be read from a file (with `${VAR}` environment
//! substitution), from any reader, or built in memory. The
//! reconfiguration engine consumes documents through [`ConfigDiff`],
//! which classifies every entry as added, modified, removed, or
//! unchanged relative to the previously applied document.

pub mod config;
pub mod diff;
pub mod error;
mod reader;

pub use config::{
    Config, JobConfig, ModuleConfig, ModuleKind, ProcessConfig, RemoteConfig, ResourceConfig,
};
pub use diff::{CollectionDiff, ConfigDiff};
pub use error::ConfigError;

/// Result type for configuration handling.
pub type Result<T> = std::result::Result<T, ConfigError>;
