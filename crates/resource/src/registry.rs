//! Process-wide registry of resource models and API method tables.
//!
//! Models register a constructor (plus optional validator and weak
//! dependency matcher) under an `(Api, Model)` key. APIs register a
//! method table mapping method-name strings to dispatch thunks, which is
//! how the job scheduler invokes arbitrary methods without the core
//! knowing any resource's concrete type.
//!
//! The registry is injectable: [`Registry::global`] is the process-wide
//! default used by a running machine, while tests construct their own
//! with [`Registry::new`] for isolation. Hot-plugged modules install and
//! remove registrations at runtime, so all mutation is concurrent-safe.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use futures::future::BoxFuture;

use chassis_config::ResourceConfig;
use chassis_core::{Api, Model, Name};

use crate::error::ResourceError;
use crate::resource::{CommandMap, Dependencies, Resource};

/// Async construction thunk for a model.
pub type Constructor = Arc<
    dyn Fn(ResourceConfig, Dependencies) -> BoxFuture<'static, Result<Arc<dyn Resource>, ResourceError>>
        + Send
        + Sync,
>;

/// Config validator; returns implicit dependency names (written like
/// `depends_on` entries) or a [`ResourceError::ValidationFailed`].
pub type Validator =
    Arc<dyn Fn(&ResourceConfig) -> Result<Vec<String>, ResourceError> + Send + Sync>;

/// Predicate selecting the resources a model weakly depends on.
pub type WeakMatcher = Arc<dyn Fn(&Name) -> bool + Send + Sync>;

/// Dispatch thunk for one named method of an API.
pub type MethodHandler = Arc<
    dyn Fn(Arc<dyn Resource>, CommandMap) -> BoxFuture<'static, Result<serde_json::Value, ResourceError>>
        + Send
        + Sync,
>;

/// Everything registered for one `(Api, Model)` pair.
#[derive(Clone)]
pub struct Registration {
    /// Builds an instance from a validated config and its ready deps.
    pub constructor: Constructor,
    /// Optional config validator run during reconfiguration phase 1.
    pub validator: Option<Validator>,
    /// Optional wildcard matcher for weak dependencies.
    pub weak_dependencies: Option<WeakMatcher>,
    /// Skip in-place reconfiguration even if the instance supports it.
    pub always_rebuild: bool,
}

impl Registration {
    /// A registration with only a constructor.
    pub fn new<F, Fut>(constructor: F) -> Self
    where
        F: Fn(ResourceConfig, Dependencies) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Arc<dyn Resource>, ResourceError>>
            + Send
            + 'static,
    {
        Self {
            constructor: Arc::new(move |cfg, deps| Box::pin(constructor(cfg, deps))),
            validator: None,
            weak_dependencies: None,
            always_rebuild: false,
        }
    }

    /// Attach a validator.
    #[must_use]
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&ResourceConfig) -> Result<Vec<String>, ResourceError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Attach a weak-dependency matcher.
    #[must_use]
    pub fn with_weak_dependencies<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&Name) -> bool + Send + Sync + 'static,
    {
        self.weak_dependencies = Some(Arc::new(matcher));
        self
    }

    /// Force rebuilds on every modification.
    #[must_use]
    pub fn always_rebuild(mut self) -> Self {
        self.always_rebuild = true;
        self
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("validator", &self.validator.is_some())
            .field("weak_dependencies", &self.weak_dependencies.is_some())
            .field("always_rebuild", &self.always_rebuild)
            .finish_non_exhaustive()
    }
}

/// Per-API descriptor: the method table used for dynamic dispatch.
#[derive(Clone, Default)]
pub struct ApiRegistration {
    methods: std::collections::HashMap<String, MethodHandler>,
}

impl ApiRegistration {
    /// An empty method table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named method.
    #[must_use]
    pub fn with_method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<dyn Resource>, CommandMap) -> BoxFuture<'static, Result<serde_json::Value, ResourceError>>
            + Send
            + Sync
            + 'static,
    {
        self.methods.insert(name.into(), Arc::new(handler));
        self
    }

    /// Look up a method handler.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<MethodHandler> {
        self.methods.get(name).cloned()
    }

    /// Registered method names, for diagnostics.
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ApiRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRegistration")
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Thread-safe registry of models and APIs.
pub struct Registry {
    models: DashMap<(Api, Model), Registration>,
    apis: DashMap<Api, ApiRegistration>,
}

impl Registry {
    /// A fresh, empty registry (test isolation, embedded runtimes).
    #[must_use]
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
            apis: DashMap::new(),
        }
    }

    /// The process-wide default registry. Initialized on first use and
    /// never torn down; tests wanting isolation use [`Registry::new`].
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Register a model. An existing registration for the same pair is
    /// replaced, which is how module upgrades re-claim their models.
    pub fn register(&self, api: Api, model: Model, registration: Registration) {
        tracing::info!(api = %api, model = %model, "registered resource model");
        self.models.insert((api, model), registration);
    }

    /// Remove a model registration (module unload, test teardown).
    pub fn deregister(&self, api: &Api, model: &Model) -> Option<Registration> {
        self.models
            .remove(&(api.clone(), model.clone()))
            .map(|(_, v)| v)
    }

    /// Look up the registration for a model.
    #[must_use]
    pub fn lookup(&self, api: &Api, model: &Model) -> Option<Registration> {
        self.models
            .get(&(api.clone(), model.clone()))
            .map(|entry| entry.value().clone())
    }

    /// Whether any registration exists for the pair.
    #[must_use]
    pub fn contains(&self, api: &Api, model: &Model) -> bool {
        self.models.contains_key(&(api.clone(), model.clone()))
    }

    /// Register (or replace) an API's method table.
    pub fn register_api(&self, api: Api, registration: ApiRegistration) {
        self.apis.insert(api, registration);
    }

    /// Look up an API's method table.
    #[must_use]
    pub fn lookup_api(&self, api: &Api) -> Option<ApiRegistration> {
        self.apis.get(api).map(|entry| entry.value().clone())
    }

    /// Resolve one method handler through the API table.
    #[must_use]
    pub fn method(&self, api: &Api, name: &str) -> Option<MethodHandler> {
        self.lookup_api(api).and_then(|reg| reg.method(name))
    }

    /// Number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether no models are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("models", &self.models.len())
            .field("apis", &self.apis.len())
            .finish()
    }
}
