//! Integration tests for FleetHQ
//!
//! These tests wire the transport, aggregator, event bus, rolling log and
//! orchestrator together the way the `fhq` binary does.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use assert_cmd::Command;
use async_trait::async_trait;
use parking_lot::Mutex;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;

use fleethq::aggregator::UpdateAggregator;
use fleethq::domain::{DeviceKey, ManagedServerRecord, RawUpdate, ServerRegistry, UNKNOWN_VALUE};
use fleethq::events::{ANY_TOPIC, BoundedRollingLog, CHANNEL_LOG, EventBus, LogRecorder, TOPIC_ERROR, TOPIC_LOG};
use fleethq::orchestrator::{MSG_FAILURE, MSG_SUCCESS, Orchestrator, OrchestratorConfig, OrchestratorState};
use fleethq::transport::{AttributePoller, AttributeValue, DeviceFilter, Transport, TransportError};

// =============================================================================
// Scripted transport
// =============================================================================

#[derive(Default)]
struct ScriptedTransport {
    values: Mutex<HashMap<(DeviceKey, String), AttributeValue>>,
    unreachable: Mutex<Vec<DeviceKey>>,
    failing_commands: Mutex<Vec<String>>,
    commands: Mutex<Vec<(DeviceKey, String)>>,
    feed: Mutex<Option<mpsc::Receiver<RawUpdate>>>,
}

impl ScriptedTransport {
    fn with_feed(rx: mpsc::Receiver<RawUpdate>) -> Self {
        let transport = Self::default();
        *transport.feed.lock() = Some(rx);
        transport
    }

    fn command_names(&self) -> Vec<String> {
        self.commands.lock().iter().map(|(_, c)| c.clone()).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn read_attribute(&self, device: &DeviceKey, attribute: &str) -> Result<AttributeValue, TransportError> {
        if self.unreachable.lock().contains(device) {
            return Err(TransportError::device(device, "timeout"));
        }
        let values = self.values.lock();
        Ok(values
            .get(&(device.clone(), attribute.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn write_attribute(&self, device: &DeviceKey, attribute: &str, value: Value) -> Result<(), TransportError> {
        self.values
            .lock()
            .insert((device.clone(), attribute.to_string()), AttributeValue::ok(value));
        Ok(())
    }

    async fn execute_command(
        &self,
        device: &DeviceKey,
        command: &str,
        _args: Option<Value>,
    ) -> Result<(), TransportError> {
        self.commands.lock().push((device.clone(), command.to_string()));
        if self.failing_commands.lock().iter().any(|c| c == command) {
            return Err(TransportError::device(device, format!("{} refused", command)));
        }
        Ok(())
    }

    async fn stream_attribute_updates(&self, _filter: DeviceFilter) -> Result<mpsc::Receiver<RawUpdate>, TransportError> {
        self.feed.lock().take().ok_or(TransportError::ChannelClosed)
    }
}

fn camel() -> DeviceKey {
    DeviceKey::new("h1", "d1")
}

fn registry() -> Arc<ServerRegistry> {
    Arc::new(ServerRegistry::new(vec![
        ManagedServerRecord::new(camel(), "Camel"),
        ManagedServerRecord::new(DeviceKey::new("h1", "sys/main/1"), "Main"),
    ]))
}

// =============================================================================
// Aggregation pipeline
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stream_to_rolling_log() {
    let (tx, rx) = mpsc::channel(16);
    let transport = ScriptedTransport::with_feed(rx);
    let registry = registry();
    let bus = Arc::new(EventBus::new(64));
    let log = Arc::new(BoundedRollingLog::new(10));
    let _recorder = LogRecorder::attach(bus.clone(), log.clone(), registry.clone(), ANY_TOPIC);

    let feed = transport.stream_attribute_updates(DeviceFilter::All).await.unwrap();
    let handle = UpdateAggregator::new(bus, registry, Duration::from_millis(50)).spawn(feed);

    tx.send(RawUpdate::value("h1", "d1", "State", "RUNNING")).await.unwrap();
    tx.send(RawUpdate::value("h1", "d1", "Status", "OK")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let entries = log.entries();
    assert_eq!(entries.len(), 2, "one snapshot yields a Status and a State entry");
    assert!(entries.iter().all(|e| e.name == "Camel"));
    // Newest first: State was published after Status
    assert_eq!(entries[0].data, Value::from("RUNNING"));
    assert_eq!(entries[1].data, Value::from("OK"));

    drop(tx);
    let stats = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert_eq!(stats.snapshots_published, 1);
}

#[tokio::test]
async fn test_poller_feeds_aggregator_with_error_sentinel() {
    let transport = Arc::new(ScriptedTransport::default());
    transport
        .values
        .lock()
        .insert((camel(), "State".to_string()), AttributeValue::ok("ON"));
    let main = DeviceKey::new("h1", "sys/main/1");
    transport.unreachable.lock().push(main.clone());

    let registry = registry();
    let bus = Arc::new(EventBus::new(64));
    let log = Arc::new(BoundedRollingLog::new(20));
    let _recorder = LogRecorder::attach(bus.clone(), log.clone(), registry.clone(), ANY_TOPIC);

    let (tx, rx) = mpsc::channel(16);
    let poller = AttributePoller::new(transport.clone(), vec![camel(), main], Duration::from_secs(60));
    for update in poller.poll_once().await {
        tx.send(update).await.unwrap();
    }
    drop(tx);

    let stats = UpdateAggregator::new(bus, registry, Duration::from_secs(60)).run(rx).await;
    assert_eq!(stats.snapshots_published, 2);

    let camel_entries: Vec<_> = log.entries().into_iter().filter(|e| e.name == "Camel").collect();
    assert_eq!(camel_entries.len(), 2);
    // Newest first: State, then the unset Status read
    assert_eq!(camel_entries[0].text(), "ON");
    assert_eq!(camel_entries[1].text(), UNKNOWN_VALUE);

    let main_entries: Vec<_> = log.entries().into_iter().filter(|e| e.name == "Main").collect();
    assert_eq!(main_entries.len(), 2);
    for entry in main_entries {
        let text = entry.text();
        assert!(text.starts_with("ERROR: "), "unexpected payload {}", text);
        assert!(text.contains("timeout"));
    }
}

// =============================================================================
// Orchestration
// =============================================================================

fn orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        main: Some(DeviceKey::new("h1", "sys/main/1")),
        configuration_manager: Some(DeviceKey::new("h1", "sys/config/1")),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_restart_success_recorded_in_log() {
    let transport = Arc::new(ScriptedTransport::default());
    let bus = Arc::new(EventBus::new(64));
    let log = Arc::new(BoundedRollingLog::new(10));
    let _recorder = LogRecorder::attach(bus.clone(), log.clone(), registry(), TOPIC_LOG);
    let orchestrator = Orchestrator::new(transport.clone(), bus, orchestrator_config());

    orchestrator.run(&["c1".to_string()]).await.unwrap();

    assert_eq!(
        transport.command_names(),
        vec!["selectCollections", "stopAll", "clearAll", "updateAll", "startAll"]
    );
    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, TOPIC_LOG);
    assert_eq!(entries[0].data, Value::from(MSG_SUCCESS));
}

#[tokio::test]
async fn test_restart_failure_broadcast_on_error_topic() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.failing_commands.lock().push("updateAll".to_string());
    let bus = Arc::new(EventBus::new(64));
    let mut receiver = bus.receiver();
    let orchestrator = Orchestrator::new(transport.clone(), bus, orchestrator_config());

    let err = orchestrator.run(&[]).await.unwrap_err();

    assert_eq!(err.failed_step(), Some("updateAll"));
    assert_eq!(
        transport.command_names(),
        vec!["selectCollections", "stopAll", "clearAll", "updateAll"]
    );
    assert!(matches!(orchestrator.state(), OrchestratorState::Failed { ref step, .. } if step == "updateAll"));

    let event = receiver.recv().await.unwrap();
    assert_eq!(event.topic.as_str(), TOPIC_ERROR);
    assert_eq!(event.channel, CHANNEL_LOG);
    assert_eq!(event.payload, Value::from(MSG_FAILURE));
    assert!(receiver.try_recv().is_err(), "exactly one outcome event");
}

// =============================================================================
// CLI
// =============================================================================

fn fhq(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fhq").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("XDG_CONFIG_HOME", home.path().join("config"));
    cmd
}

#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    fhq(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("restart"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("fleethq.log"));
}

#[test]
fn test_cli_prints_effective_config() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("fleet.yml");
    fs::write(
        &config,
        "fleet:\n  servers:\n    - id: h1/d1\n      name: Camel\naggregator:\n  window-ms: 1500\n",
    )
    .unwrap();

    fhq(&home)
        .arg("-c")
        .arg(&config)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("window-ms: 1500"))
        .stdout(predicate::str::contains("h1/d1"));
}

#[test]
fn test_cli_rejects_invalid_config() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("fleet.yml");
    fs::write(&config, "log:\n  capacity: 5000\n").unwrap();

    fhq(&home)
        .arg("-c")
        .arg(&config)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_cli_restart_without_main_fails_before_any_call() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("fleet.yml");
    fs::write(&config, "fleet:\n  configuration-manager: h1/sys/config/1\n").unwrap();

    fhq(&home)
        .arg("-c")
        .arg(&config)
        .args(["restart", "-C", "c1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Can not perform action").count(1))
        .stderr(predicate::str::contains("main server has not been set"));
}
