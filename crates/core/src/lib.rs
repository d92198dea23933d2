//! # Chassis Core
//!
//! Shared identifier types for the chassis runtime. Every addressable
//! entity on a running machine, be it a component, a service, or a
//! remote export, is keyed by a fully-qualified [`Name`], and every concrete
//! implementation of an API surface is identified by a [`Model`].
//!
//! These types are leaves: they parse, print, order, and nothing else.
//! All other chassis crates build on them.

pub mod error;
pub mod log;
pub mod name;

pub use error::NameError;
pub use log::{LogConfiguration, LogLevel};
pub use name::{Api, ApiKind, Model, Name};

/// Result type for name/identifier parsing.
pub type Result<T> = std::result::Result<T, NameError>;
