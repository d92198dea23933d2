//! Per-resource lifecycle record.
//!
//! A node tracks one name through the runtime's lifecycle: the config it
//! was last declared with, the instance most recently built for it, and
//! where it currently sits in the configuring/ready/unresolved/errored
//! state machine. Nodes are shared between graph snapshots as
//! `Arc<RwLock<Node>>`, so a snapshot observes state transitions made
//! by the reconfiguration engine without copying.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use chassis_config::ResourceConfig;
use chassis_core::{Model, Name};

use crate::error::ResourceError;
use crate::resource::Resource;

/// Shared handle to a node.
pub type NodeRef = Arc<RwLock<Node>>;

/// Where a node sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Created or modified; construction has not finished.
    Configuring,
    /// Instance built and usable.
    Ready,
    /// One or more strong dependencies missing or not ready; retried by
    /// the completion worker.
    Unresolved,
    /// Construction failed; retried by the completion worker.
    Errored,
    /// Close timed out during removal; the node is being force-dropped.
    Removing,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuring => "configuring",
            Self::Ready => "ready",
            Self::Unresolved => "unresolved",
            Self::Errored => "errored",
            Self::Removing => "removing",
        };
        f.write_str(s)
    }
}

/// Lifecycle record for one named resource.
#[derive(Debug)]
pub struct Node {
    name: Name,
    declared: ResourceConfig,
    instance: Option<Arc<dyn Resource>>,
    state: NodeState,
    last_err: Option<String>,
    unresolved_deps: Vec<String>,
    /// The model the current instance was built with; drives the
    /// rebuild-vs-reconfigure decision when the declared model changes.
    built_model: Option<Model>,
    /// Bumped on every successful build so concurrent passes can detect
    /// that their work went stale.
    generation: u64,
}

impl Node {
    /// A freshly declared node, awaiting construction.
    #[must_use]
    pub fn new(name: Name, declared: ResourceConfig) -> Self {
        Self {
            name,
            declared,
            instance: None,
            state: NodeState::Configuring,
            last_err: None,
            unresolved_deps: Vec::new(),
            built_model: None,
            generation: 0,
        }
    }

    /// Wrap into the shared handle form used by the graph.
    #[must_use]
    pub fn into_ref(self) -> NodeRef {
        Arc::new(RwLock::new(self))
    }

    /// The node's fully-qualified name.
    #[must_use]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The last accepted config.
    #[must_use]
    pub fn declared(&self) -> &ResourceConfig {
        &self.declared
    }

    /// Replace the declared config (modification accepted; instance not
    /// yet rebuilt). Moves the node back to configuring.
    pub fn set_declared(&mut self, config: ResourceConfig) {
        self.declared = config;
        self.state = NodeState::Configuring;
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// The build counter.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The most recent error string, if any.
    #[must_use]
    pub fn last_err(&self) -> Option<&str> {
        self.last_err.as_deref()
    }

    /// Dependencies this node is blocked on, when unresolved.
    #[must_use]
    pub fn unresolved_deps(&self) -> &[String] {
        &self.unresolved_deps
    }

    /// The current instance regardless of state, e.g. for teardown.
    #[must_use]
    pub fn instance(&self) -> Option<Arc<dyn Resource>> {
        self.instance.clone()
    }

    /// Remove and return the instance for closing.
    pub fn take_instance(&mut self) -> Option<Arc<dyn Resource>> {
        self.instance.take()
    }

    /// The model the current instance was built with.
    #[must_use]
    pub fn built_model(&self) -> Option<&Model> {
        self.built_model.as_ref()
    }

    /// A build succeeded.
    pub fn mark_ready(&mut self, instance: Arc<dyn Resource>) {
        self.instance = Some(instance);
        self.state = NodeState::Ready;
        self.last_err = None;
        self.unresolved_deps.clear();
        self.built_model = Some(self.declared.model.clone());
        self.generation += 1;
    }

    /// An in-place reconfigure succeeded; same instance, new build.
    pub fn mark_reconfigured(&mut self) {
        self.state = NodeState::Ready;
        self.last_err = None;
        self.unresolved_deps.clear();
        self.generation += 1;
    }

    /// Strong dependencies are missing or not ready.
    pub fn mark_unresolved(&mut self, missing: Vec<String>) {
        self.state = NodeState::Unresolved;
        self.unresolved_deps = missing;
        self.last_err = None;
    }

    /// A bare dependency matched more than one source. Still unresolved
    /// (qualifying the name or a remote going away resolves it), but the
    /// reason is kept for status reporting.
    pub fn mark_unresolved_ambiguous(&mut self, dep: &str, candidates: Vec<String>) {
        self.state = NodeState::Unresolved;
        self.unresolved_deps = vec![dep.to_owned()];
        self.last_err = Some(
            ResourceError::Ambiguous {
                name: dep.to_owned(),
                candidates,
            }
            .to_string(),
        );
    }

    /// Construction failed.
    pub fn mark_errored(&mut self, err: impl Into<String>) {
        self.state = NodeState::Errored;
        self.last_err = Some(err.into());
    }

    /// Close timed out; the node will be force-dropped.
    pub fn mark_removing(&mut self) {
        self.state = NodeState::Removing;
    }

    /// Whether the completion worker should retry this node.
    #[must_use]
    pub fn needs_retry(&self) -> bool {
        matches!(self.state, NodeState::Unresolved | NodeState::Errored)
    }

    /// The instance, if the node is usable by callers.
    pub fn resource(&self) -> Result<Arc<dyn Resource>, ResourceError> {
        match self.state {
            NodeState::Ready => self.instance.clone().ok_or_else(|| ResourceError::NotFound {
                name: self.name.to_string(),
            }),
            NodeState::Configuring | NodeState::Unresolved => Err(ResourceError::Unresolved {
                name: self.name.to_string(),
                missing: self.unresolved_deps.clone(),
            }),
            NodeState::Errored => Err(ResourceError::ConstructionFailed {
                message: self
                    .last_err
                    .clone()
                    .unwrap_or_else(|| "construction failed".to_owned()),
            }),
            NodeState::Removing => Err(ResourceError::NotFound {
                name: self.name.to_string(),
            }),
        }
    }
}
