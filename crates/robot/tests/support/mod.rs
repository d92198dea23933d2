//! Shared fakes for machine integration tests.

#![allow(dead_code)] // each test binary uses a subset

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use chassis_config::{Config, JobConfig, RemoteConfig, ResourceConfig};
use chassis_core::{Api, Model, Name};
use chassis_resource::{
    ApiRegistration, CommandMap, Dependencies, Registration, Registry, Resource, ResourceError,
};
use chassis_robot::{RemoteDialer, RemoteRobot, Robot, RobotOptions};

/// Order-of-events recorder shared across fakes.
#[derive(Debug, Default, Clone)]
pub struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Entries with the given prefix, in order.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }
}

/// A counting fake driver instance.
pub struct FakeResource {
    pub name: String,
    pub reconf_count: AtomicUsize,
    pub close_count: AtomicUsize,
    pub read_count: AtomicUsize,
    pub do_count: AtomicUsize,
    /// Dependency names seen at construction or the last reconfigure.
    pub seen_deps: Mutex<Vec<Name>>,
    reconfigurable: bool,
    panic_on_read: AtomicBool,
    recorder: Recorder,
}

impl FakeResource {
    /// A counting instance not tied to any registry or recorder, e.g.
    /// for exports of a fake remote or a fake module host.
    pub fn standalone(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_owned(),
            reconf_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            read_count: AtomicUsize::new(0),
            do_count: AtomicUsize::new(0),
            seen_deps: Mutex::new(Vec::new()),
            reconfigurable: true,
            panic_on_read: AtomicBool::new(false),
            recorder: Recorder::default(),
        })
    }

    pub fn seen_dep_names(&self) -> Vec<String> {
        self.seen_deps.lock().iter().map(ToString::to_string).collect()
    }

    pub fn record_seen_deps(&self, deps: &Dependencies) {
        let mut seen: Vec<Name> = deps.keys().cloned().collect();
        seen.sort();
        *self.seen_deps.lock() = seen;
    }
}

#[async_trait]
impl Resource for FakeResource {
    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync) {
        self
    }

    async fn reconfigure(
        &self,
        deps: &Dependencies,
        _config: &ResourceConfig,
    ) -> Result<(), ResourceError> {
        if !self.reconfigurable {
            return Err(ResourceError::NotReconfigurable);
        }
        let mut seen: Vec<Name> = deps.keys().cloned().collect();
        seen.sort();
        *self.seen_deps.lock() = seen;
        self.reconf_count.fetch_add(1, Ordering::SeqCst);
        self.recorder.push(format!("reconfigure:{}", self.name));
        Ok(())
    }

    async fn do_command(&self, command: &CommandMap) -> Result<CommandMap, ResourceError> {
        self.do_count.fetch_add(1, Ordering::SeqCst);
        Ok(command.clone())
    }

    async fn close(&self) -> Result<(), ResourceError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.recorder.push(format!("close:{}", self.name));
        Ok(())
    }
}

impl FakeResource {
    pub async fn get_readings(&self) -> Result<serde_json::Value, ResourceError> {
        assert!(
            !self.panic_on_read.load(Ordering::SeqCst),
            "reading exploded"
        );
        self.read_count.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({"reading": 1}))
    }
}

/// Registry, recorder, and the instances the constructors produced.
pub struct Fixture {
    pub registry: Arc<Registry>,
    pub recorder: Recorder,
    instances: Arc<Mutex<HashMap<String, Arc<FakeResource>>>>,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self {
            registry: Arc::new(Registry::new()),
            recorder: Recorder::default(),
            instances: Arc::new(Mutex::new(HashMap::new())),
        };
        for api in [sensor_api(), arm_api(), base_api()] {
            fixture.register_model(&api, "fake", true);
            fixture.register_model(&api, "rigid", false);
            fixture.registry.register_api(
                api,
                ApiRegistration::new().with_method("GetReadings", |resource, _args| {
                    Box::pin(async move {
                        let fake = resource
                            .as_any()
                            .downcast_ref::<FakeResource>()
                            .ok_or_else(|| ResourceError::Other("not a fake".into()))?;
                        fake.get_readings().await
                    })
                }),
            );
        }
        fixture
    }

    /// Register a counting model under `(api, model_name)`.
    pub fn register_model(&self, api: &Api, model_name: &str, reconfigurable: bool) {
        let recorder = self.recorder.clone();
        let instances = self.instances.clone();
        let registration = Registration::new(move |cfg: ResourceConfig, deps: Dependencies| {
            let recorder = recorder.clone();
            let instances = instances.clone();
            async move {
                if cfg.attributes.get("fail").is_some_and(|v| v == &serde_json::json!(true)) {
                    return Err(ResourceError::Other("configured to fail".into()));
                }
                let mut seen: Vec<Name> = deps.keys().cloned().collect();
                seen.sort();
                let resource = Arc::new(FakeResource {
                    name: cfg.name.clone(),
                    reconf_count: AtomicUsize::new(0),
                    close_count: AtomicUsize::new(0),
                    read_count: AtomicUsize::new(0),
                    do_count: AtomicUsize::new(0),
                    seen_deps: Mutex::new(seen),
                    reconfigurable,
                    panic_on_read: AtomicBool::new(
                        cfg.attributes
                            .get("panic_readings")
                            .is_some_and(|v| v == &serde_json::json!(true)),
                    ),
                    recorder: recorder.clone(),
                });
                recorder.push(format!("build:{}", cfg.name));
                instances.lock().insert(cfg.name.clone(), resource.clone());
                Ok(resource as Arc<dyn Resource>)
            }
        });
        self.registry
            .register(api.clone(), Model::builtin(model_name).unwrap(), registration);
    }

    /// The most recently constructed instance for a short name.
    pub fn instance(&self, name: &str) -> Arc<FakeResource> {
        self.instances
            .lock()
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("no instance built for {name}"))
    }

    pub fn has_instance(&self, name: &str) -> bool {
        self.instances.lock().contains_key(name)
    }

    /// A robot with test-friendly timings.
    pub fn robot(&self) -> Robot {
        Robot::builder(self.registry.clone())
            .with_options(fast_options())
            .build()
    }
}

pub fn fast_options() -> RobotOptions {
    RobotOptions {
        construction_timeout: Duration::from_secs(2),
        close_timeout: Duration::from_secs(1),
        completion_interval: Duration::from_millis(50),
    }
}

pub fn sensor_api() -> Api {
    Api::component("sensor").unwrap()
}

pub fn arm_api() -> Api {
    Api::component("arm").unwrap()
}

pub fn base_api() -> Api {
    Api::component("base").unwrap()
}

/// A component config on the `fake` (reconfigurable) model.
pub fn component(api: &Api, name: &str, depends_on: &[&str]) -> ResourceConfig {
    ResourceConfig {
        name: name.to_owned(),
        api: api.clone(),
        model: Model::builtin("fake").unwrap(),
        attributes: serde_json::Map::new(),
        depends_on: depends_on.iter().map(|s| (*s).to_owned()).collect(),
        frame: None,
        log_configuration: None,
        implicit_depends_on: Vec::new(),
    }
}

pub fn config_of(components: Vec<ResourceConfig>) -> Config {
    Config {
        components,
        ..Default::default()
    }
}

pub fn job(name: &str, schedule: &str, resource: &str, method: &str) -> JobConfig {
    JobConfig {
        name: name.to_owned(),
        schedule: schedule.to_owned(),
        resource: resource.to_owned(),
        method: method.to_owned(),
        command: CommandMap::new(),
        log_configuration: None,
    }
}

// ── Fake remotes ───────────────────────────────────────────────────────────

/// An in-process peer standing in for an RPC-connected machine.
pub struct FakeRemote {
    online: AtomicBool,
    exports: Mutex<HashMap<Name, Arc<dyn Resource>>>,
    changes_tx: watch::Sender<u64>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        let (changes_tx, _) = watch::channel(0);
        Arc::new(Self {
            online: AtomicBool::new(true),
            exports: Mutex::new(HashMap::new()),
            changes_tx,
        })
    }

    pub fn export(&self, name: Name, resource: Arc<dyn Resource>) {
        self.exports.lock().insert(name, resource);
        self.bump();
    }

    pub fn withdraw(&self, name: &Name) {
        self.exports.lock().remove(name);
        self.bump();
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        self.bump();
    }

    fn bump(&self) {
        self.changes_tx.send_modify(|v| *v += 1);
    }

    fn check_online(&self, what: &str) -> Result<(), ResourceError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ResourceError::RemoteUnavailable {
                remote: "fake".into(),
                message: format!("offline during {what}"),
            })
        }
    }
}

#[async_trait]
impl RemoteRobot for FakeRemote {
    async fn resource_names(&self) -> Result<Vec<Name>, ResourceError> {
        self.check_online("resource_names")?;
        Ok(self.exports.lock().keys().cloned().collect())
    }

    async fn resource(&self, name: &Name) -> Result<Arc<dyn Resource>, ResourceError> {
        self.check_online("resource")?;
        self.exports
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound {
                name: name.to_string(),
            })
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes_tx.subscribe()
    }

    async fn close(&self) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Dialer over a fixed set of fake remotes.
pub struct FakeDialer {
    remotes: Mutex<HashMap<String, Arc<FakeRemote>>>,
}

impl FakeDialer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            remotes: Mutex::new(HashMap::new()),
        })
    }

    pub fn add(&self, name: &str, remote: Arc<FakeRemote>) {
        self.remotes.lock().insert(name.to_owned(), remote);
    }
}

#[async_trait]
impl RemoteDialer for FakeDialer {
    async fn dial(&self, config: &RemoteConfig) -> Result<Arc<dyn RemoteRobot>, ResourceError> {
        let remote = self
            .remotes
            .lock()
            .get(&config.name)
            .cloned()
            .ok_or_else(|| ResourceError::RemoteUnavailable {
                remote: config.name.clone(),
                message: "unknown address".into(),
            })?;
        if !remote.online.load(Ordering::SeqCst) {
            return Err(ResourceError::RemoteUnavailable {
                remote: config.name.clone(),
                message: "connection refused".into(),
            });
        }
        Ok(remote as Arc<dyn RemoteRobot>)
    }
}

/// Wait until `predicate` holds or `deadline` elapses; polls every 20ms.
pub async fn wait_for(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    predicate()
}
