//! Shared fakes for scheduler integration tests.

#![allow(dead_code)] // each test binary uses a subset

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use chassis_core::{Api, Name};
use chassis_jobs::{ResolvedTarget, ResourceResolver};
use chassis_resource::{ApiRegistration, CommandMap, Registry, Resource, ResourceError};

/// A sensor with observable counters.
#[derive(Default)]
pub struct FakeSensor {
    pub readings: AtomicUsize,
    pub do_commands: AtomicUsize,
    pub closes: AtomicUsize,
    pub last_command: Mutex<CommandMap>,
    panic_on_readings: bool,
}

impl FakeSensor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sensor whose `GetReadings` panics every time.
    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            panic_on_readings: true,
            ..Default::default()
        })
    }

    pub async fn get_readings(&self) -> Result<serde_json::Value, ResourceError> {
        assert!(!self.panic_on_readings, "sensor exploded");
        self.readings.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({"reading": 1}))
    }
}

#[async_trait]
impl Resource for FakeSensor {
    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync) {
        self
    }

    async fn do_command(&self, command: &CommandMap) -> Result<CommandMap, ResourceError> {
        self.do_commands.fetch_add(1, Ordering::SeqCst);
        *self.last_command.lock() = command.clone();
        Ok(command.clone())
    }

    async fn close(&self) -> Result<(), ResourceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A resource with no optional capabilities at all.
pub struct BareResource;

#[async_trait]
impl Resource for BareResource {
    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync) {
        self
    }

    async fn close(&self) -> Result<(), ResourceError> {
        Ok(())
    }
}

pub fn sensor_api() -> Api {
    Api::component("sensor").unwrap()
}

pub fn sensor_name(short: &str) -> Name {
    Name::new(sensor_api(), short).unwrap()
}

/// A registry whose sensor API exposes `GetReadings` through the method
/// table, the way a driver package would register it.
pub fn sensor_registry() -> Arc<Registry> {
    let registry = Registry::new();
    registry.register_api(
        sensor_api(),
        ApiRegistration::new().with_method("GetReadings", |resource, _args| {
            Box::pin(async move {
                let sensor = resource
                    .as_any()
                    .downcast_ref::<FakeSensor>()
                    .ok_or_else(|| ResourceError::Other("not a fake sensor".into()))?;
                sensor.get_readings().await
            })
        }),
    );
    Arc::new(registry)
}

/// Resolver backed by a plain map, standing in for the robot facade.
#[derive(Default)]
pub struct MapResolver {
    targets: RwLock<HashMap<String, (Name, Arc<dyn Resource>)>>,
}

impl MapResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, name: Name, resource: Arc<dyn Resource>) {
        self.targets
            .write()
            .insert(name.short_name(), (name, resource));
    }

    pub fn remove(&self, short: &str) {
        self.targets.write().remove(short);
    }
}

impl ResourceResolver for MapResolver {
    fn resolve(&self, resource: &str) -> Result<ResolvedTarget, ResourceError> {
        self.targets
            .read()
            .get(resource)
            .map(|(name, instance)| ResolvedTarget {
                name: name.clone(),
                resource: instance.clone(),
            })
            .ok_or_else(|| ResourceError::NotFound {
                name: resource.to_owned(),
            })
    }
}

/// A job config with no command and default log level.
pub fn job_config(name: &str, schedule: &str, resource: &str, method: &str) -> chassis_config::JobConfig {
    chassis_config::JobConfig {
        name: name.to_owned(),
        schedule: schedule.to_owned(),
        resource: resource.to_owned(),
        method: method.to_owned(),
        command: CommandMap::new(),
        log_configuration: None,
    }
}

/// The jobs diff that takes a manager from `prev` to `next`.
pub fn jobs_diff(
    prev: &[chassis_config::JobConfig],
    next: &[chassis_config::JobConfig],
) -> chassis_config::CollectionDiff<chassis_config::JobConfig> {
    let prev = chassis_config::Config {
        jobs: prev.to_vec(),
        ..Default::default()
    };
    let next = chassis_config::Config {
        jobs: next.to_vec(),
        ..Default::default()
    };
    chassis_config::ConfigDiff::new(&prev, &next).jobs
}

/// One captured tracing event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: tracing::Level,
    pub message: String,
    pub error: Option<String>,
}

/// Events captured by [`capture`], shared with the test body.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<CapturedEvent>>>);

impl EventLog {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.0.lock().clone()
    }

    /// Count events with an exact level and message.
    pub fn count(&self, level: tracing::Level, message: &str) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|e| e.level == level && e.message == message)
            .count()
    }

    /// The `error` fields of events with the given message.
    pub fn errors_for(&self, message: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|e| e.message == message)
            .filter_map(|e| e.error.clone())
            .collect()
    }
}

struct CaptureLayer {
    log: EventLog,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        struct Visitor {
            message: Option<String>,
            error: Option<String>,
        }
        impl tracing::field::Visit for Visitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                match field.name() {
                    "message" => self.message = Some(format!("{value:?}")),
                    "error" => self.error = Some(format!("{value:?}")),
                    _ => {}
                }
            }

            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                match field.name() {
                    "message" => self.message = Some(value.to_owned()),
                    "error" => self.error = Some(value.to_owned()),
                    _ => {}
                }
            }
        }

        let mut visitor = Visitor {
            message: None,
            error: None,
        };
        event.record(&mut visitor);
        self.log.0.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message.unwrap_or_default(),
            error: visitor.error,
        });
    }
}

/// Install an event-capturing subscriber for the current thread.
///
/// Works because `#[tokio::test]` runs a current-thread runtime: every
/// worker task lands on the thread the guard is installed on.
pub fn capture() -> (tracing::subscriber::DefaultGuard, EventLog) {
    use tracing_subscriber::layer::SubscriberExt;

    let log = EventLog::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer { log: log.clone() });
    let guard = tracing::subscriber::set_default(subscriber);
    (guard, log)
}
