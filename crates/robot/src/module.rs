//! The narrow seam to the out-of-process module host.
//!
//! The module manager is an external collaborator: it spawns module
//! executables, speaks their wire protocol, and hands back resource
//! proxies. The core only ever talks through this trait, so tests (and
//! embedded builds) substitute an in-process fake.

use std::sync::Arc;

use async_trait::async_trait;

use chassis_config::{ModuleConfig, ResourceConfig};
use chassis_core::{Api, Model, Name};
use chassis_resource::{Dependencies, Resource, ResourceError};

/// Host of out-of-process resource implementations.
#[async_trait]
pub trait ModuleManager: Send + Sync + 'static {
    /// Start (or restart) a module.
    async fn add_module(&self, config: &ModuleConfig) -> Result<(), ResourceError>;

    /// Stop a module and release its resources.
    async fn remove_module(&self, name: &str) -> Result<(), ResourceError>;

    /// Whether any running module claims this model.
    fn provides(&self, api: &Api, model: &Model) -> bool;

    /// Construct a resource inside its module.
    async fn add_resource(
        &self,
        config: &ResourceConfig,
        deps: &Dependencies,
    ) -> Result<Arc<dyn Resource>, ResourceError>;

    /// Reconfigure a module-hosted resource in place.
    async fn reconfigure_resource(
        &self,
        config: &ResourceConfig,
        deps: &Dependencies,
    ) -> Result<(), ResourceError>;

    /// Tear down a module-hosted resource.
    async fn remove_resource(&self, name: &Name) -> Result<(), ResourceError>;
}
