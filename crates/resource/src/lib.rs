//! # Chassis Resource
//!
//! The resource layer of the runtime: the capability trait every hosted
//! resource implements, the process-wide registry mapping `(Api, Model)`
//! pairs to constructors, and the dependency graph the reconfiguration
//! engine mutates.
//!
//! A resource is opaque to the core. The core can close it, ask it to
//! reconfigure in place (optional), send it a generic `DoCommand`, and
//! dispatch named methods through the per-API method table registered
//! alongside its constructor. Everything else about a resource is its
//! driver's business.

pub mod error;
pub mod graph;
pub mod node;
pub mod registry;
pub mod resource;

pub use error::ResourceError;
pub use graph::{Graph, GraphError};
pub use node::{Node, NodeRef, NodeState};
pub use registry::{
    ApiRegistration, Constructor, MethodHandler, Registration, Registry, Validator, WeakMatcher,
};
pub use resource::{CommandMap, Dependencies, Resource};

/// Result type for resource operations.
pub type Result<T> = std::result::Result<T, ResourceError>;
