//! Remote machine connections.
//!
//! A remote is a peer whose resources are imported into the local graph
//! under the remote's name prefix. The RPC client is an external
//! collaborator behind [`RemoteRobot`]; the core dials through a
//! [`RemoteDialer`] and treats the result as a secondary node source.
//!
//! Connectivity is event-driven: every remote exposes a change counter
//! the core forwards into the completion worker, which re-imports the
//! remote's exports and retries any dependents that were unresolved
//! while the remote was away.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use chassis_config::RemoteConfig;
use chassis_core::Name;
use chassis_resource::{Resource, ResourceError};

/// A connected peer machine.
#[async_trait]
pub trait RemoteRobot: Send + Sync + 'static {
    /// The peer's currently exported resource names (unprefixed).
    ///
    /// An error means the peer is unreachable; the caller drops its
    /// imports and retries later.
    async fn resource_names(&self) -> Result<Vec<Name>, ResourceError>;

    /// A proxy for one exported resource.
    async fn resource(&self, name: &Name) -> Result<Arc<dyn Resource>, ResourceError>;

    /// A counter bumped whenever the peer's export set (or reachability)
    /// may have changed. The initial value is observed on subscribe.
    fn changes(&self) -> watch::Receiver<u64>;

    /// Drop the connection.
    async fn close(&self) -> Result<(), ResourceError>;
}

/// Establishes connections to remotes.
///
/// Dialing failures are retryable: the completion worker re-dials
/// offline remotes on every wake.
#[async_trait]
pub trait RemoteDialer: Send + Sync + 'static {
    /// Connect to the peer described by `config`.
    async fn dial(&self, config: &RemoteConfig) -> Result<Arc<dyn RemoteRobot>, ResourceError>;
}

/// Book-keeping for one configured remote.
pub(crate) struct RemoteHandle {
    pub config: RemoteConfig,
    /// The live client, when the last dial succeeded.
    pub client: Option<Arc<dyn RemoteRobot>>,
    /// Names currently imported into the local graph from this remote.
    pub imported: Vec<Name>,
    /// Forwards the client's change signal into the completion trigger.
    pub forwarder: Option<tokio::task::JoinHandle<()>>,
}

impl RemoteHandle {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            client: None,
            imported: Vec::new(),
            forwarder: None,
        }
    }

    pub fn online(&self) -> bool {
        self.client.is_some()
    }

    /// Stop forwarding change signals.
    pub fn stop_forwarder(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

impl Drop for RemoteHandle {
    fn drop(&mut self) {
        self.stop_forwarder();
    }
}
