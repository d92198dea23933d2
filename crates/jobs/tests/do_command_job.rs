//! `DoCommand` dispatch: the command map reaches the resource, and
//! resources without the capability fail with the fixed reason string.

mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chassis_core::{Api, Name};
use chassis_jobs::JobManager;
use chassis_resource::CommandMap;

use support::{capture, job_config, jobs_diff, sensor_name, BareResource, FakeSensor, MapResolver};

#[tokio::test]
async fn do_command_jobs_reach_their_own_targets() {
    let registry = support::sensor_registry();
    let resolver = MapResolver::new();
    let arm_api = Api::component("arm").unwrap();
    let arm1 = FakeSensor::new();
    let arm2 = FakeSensor::new();
    resolver.insert(Name::new(arm_api.clone(), "arm1").unwrap(), arm1.clone());
    resolver.insert(Name::new(arm_api, "arm2").unwrap(), arm2.clone());

    let mut command = CommandMap::new();
    command.insert("cmd".into(), serde_json::json!("bump"));
    let mut fast = job_config("fast", "30ms", "arm1", "DoCommand");
    fast.command = command.clone();
    let slow = job_config("slow", "90ms", "arm2", "DoCommand");

    let mut manager = JobManager::new(registry, resolver);
    manager.reconfigure(&jobs_diff(&[], &[fast, slow])).await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    manager.close().await;

    let fast_count = arm1.do_commands.load(Ordering::SeqCst);
    let slow_count = arm2.do_commands.load(Ordering::SeqCst);
    assert!(fast_count > slow_count, "{fast_count} vs {slow_count}");
    assert!(slow_count >= 2, "slow job fired {slow_count} times");

    // The configured command map reached the driver.
    assert_eq!(arm1.last_command.lock()["cmd"], "bump");
    assert!(arm2.last_command.lock().is_empty());
}

#[tokio::test]
async fn missing_do_command_capability_uses_fixed_reason() {
    let (_guard, log) = capture();

    let registry = support::sensor_registry();
    let resolver = MapResolver::new();
    resolver.insert(sensor_name("bare"), Arc::new(BareResource));

    let mut manager = JobManager::new(registry, resolver);
    manager
        .reconfigure(&jobs_diff(&[], &[job_config("j", "30ms", "bare", "DoCommand")]))
        .await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    manager.close().await;

    let histories = manager.histories();
    assert!(histories.is_empty(), "histories drop with the worker");

    let reasons = log.errors_for("Job failed");
    assert!(!reasons.is_empty(), "expected failures: {:?}", log.events());
    assert!(reasons.iter().all(|r| r == "DoCommand unimplemented"));
}

#[tokio::test]
async fn unknown_method_fails_with_method_unimplemented() {
    let (_guard, log) = capture();

    let registry = support::sensor_registry();
    let resolver = MapResolver::new();
    resolver.insert(sensor_name("s"), FakeSensor::new());

    let mut manager = JobManager::new(registry, resolver);
    manager
        .reconfigure(&jobs_diff(&[], &[job_config("j", "30ms", "s", "NoSuchMethod")]))
        .await;

    tokio::time::sleep(Duration::from_millis(150)).await;

    let runs = manager.histories()["j"].clone();
    assert!(!runs.recent_failed_runs.is_empty());
    assert!(runs.recent_successful_runs.is_empty());

    let reasons = log.errors_for("Job failed");
    assert!(reasons.iter().all(|r| r == "method unimplemented"));

    manager.close().await;
}
