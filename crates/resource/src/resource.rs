//! The resource capability trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use chassis_config::ResourceConfig;
use chassis_core::Name;

use crate::error::ResourceError;

/// Argument and result maps for generic command dispatch.
pub type CommandMap = serde_json::Map<String, serde_json::Value>;

/// Ready dependencies handed to constructors and `reconfigure`.
pub type Dependencies = HashMap<Name, Arc<dyn Resource>>;

/// A hosted resource.
///
/// The capability set is deliberately small: the core closes resources,
/// optionally reconfigures them in place, and forwards generic commands.
/// Named method dispatch goes through the per-API method table (see
/// [`ApiRegistration`](crate::registry::ApiRegistration)) rather than
/// through this trait, so drivers add methods without touching the core.
///
/// `reconfigure` and `do_command` have default bodies that report the
/// capability as missing; a driver overrides exactly what it supports.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Downcast support for API method tables.
    ///
    /// Method handlers registered per API receive `Arc<dyn Resource>`
    /// and downcast to the concrete driver type; every driver implements
    /// this as `self`.
    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync);

    /// Apply a new config in place.
    ///
    /// The default declines, which makes the engine tear the resource
    /// down and rebuild it with the new config.
    async fn reconfigure(
        &self,
        _deps: &Dependencies,
        _config: &ResourceConfig,
    ) -> Result<(), ResourceError> {
        Err(ResourceError::NotReconfigurable)
    }

    /// Execute a generic, driver-defined command.
    async fn do_command(&self, _command: &CommandMap) -> Result<CommandMap, ResourceError> {
        Err(ResourceError::DoCommandUnimplemented)
    }

    /// Release the resource. Called exactly once before the node is
    /// dropped from the graph.
    async fn close(&self) -> Result<(), ResourceError>;
}

impl std::fmt::Debug for dyn Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<resource>")
    }
}
