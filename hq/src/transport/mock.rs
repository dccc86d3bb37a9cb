//! Mock transport for unit tests

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::{AttributeValue, DeviceFilter, Transport, TransportError};
use crate::domain::{DeviceKey, RawUpdate};

/// One recorded command invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCall {
    pub device: DeviceKey,
    pub command: String,
    pub args: Option<Value>,
}

#[derive(Default)]
struct MockState {
    attributes: HashMap<(DeviceKey, String), AttributeValue>,
    read_failures: HashMap<DeviceKey, String>,
    command_failures: HashMap<String, String>,
    writes: Vec<(DeviceKey, String, Value)>,
    commands: Vec<CommandCall>,
    feed: Option<mpsc::Receiver<RawUpdate>>,
}

/// Scriptable in-memory transport that records every call
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    command_delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        debug!("MockTransport::new: called");
        Self::default()
    }

    /// Every command sleeps for `delay` before answering
    pub fn with_command_delay(delay: Duration) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            command_delay: Some(delay),
        }
    }

    pub fn set_attribute(&self, device: &DeviceKey, attribute: &str, value: AttributeValue) {
        self.state
            .lock()
            .attributes
            .insert((device.clone(), attribute.to_string()), value);
    }

    /// Every read on `device` fails with `error`'s message
    pub fn fail_reads(&self, device: &DeviceKey, error: TransportError) {
        self.state.lock().read_failures.insert(device.clone(), error.to_string());
    }

    /// Every invocation of `command` fails
    pub fn fail_command(&self, command: &str, message: &str) {
        self.state
            .lock()
            .command_failures
            .insert(command.to_string(), message.to_string());
    }

    /// Feed returned by the next `stream_attribute_updates` call
    pub fn set_feed(&self, rx: mpsc::Receiver<RawUpdate>) {
        self.state.lock().feed = Some(rx);
    }

    pub fn commands(&self) -> Vec<CommandCall> {
        self.state.lock().commands.clone()
    }

    pub fn command_names(&self) -> Vec<String> {
        self.state.lock().commands.iter().map(|c| c.command.clone()).collect()
    }

    pub fn writes(&self) -> Vec<(DeviceKey, String, Value)> {
        self.state.lock().writes.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read_attribute(&self, device: &DeviceKey, attribute: &str) -> Result<AttributeValue, TransportError> {
        let state = self.state.lock();
        if let Some(message) = state.read_failures.get(device) {
            return Err(TransportError::device(device, message.clone()));
        }
        Ok(state
            .attributes
            .get(&(device.clone(), attribute.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn write_attribute(&self, device: &DeviceKey, attribute: &str, value: Value) -> Result<(), TransportError> {
        self.state
            .lock()
            .writes
            .push((device.clone(), attribute.to_string(), value));
        Ok(())
    }

    async fn execute_command(
        &self,
        device: &DeviceKey,
        command: &str,
        args: Option<Value>,
    ) -> Result<(), TransportError> {
        self.state.lock().commands.push(CommandCall {
            device: device.clone(),
            command: command.to_string(),
            args,
        });
        if let Some(delay) = self.command_delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.state.lock().command_failures.get(command).cloned();
        match failure {
            Some(message) => Err(TransportError::device(device, message)),
            None => Ok(()),
        }
    }

    async fn stream_attribute_updates(&self, _filter: DeviceFilter) -> Result<mpsc::Receiver<RawUpdate>, TransportError> {
        self.state.lock().feed.take().ok_or(TransportError::ChannelClosed)
    }
}
