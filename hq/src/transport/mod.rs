//! Remote control transport
//!
//! The transport is the only path to the managed servers: attribute reads and
//! writes, command execution, and a live feed of attribute updates. Everything
//! above it (aggregation, orchestration) talks to [`Transport`] only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::{DeviceKey, RawUpdate};

mod error;
#[cfg(test)]
pub mod mock;
mod poller;
mod rest;

pub use error::TransportError;
pub use poller::{AttributePoller, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLLED_ATTRIBUTES};
pub use rest::RestTransport;

/// Result of a single attribute read
///
/// A device may answer the request but report a per-attribute failure; that
/// lands in `error` rather than failing the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttributeValue {
    pub fn ok(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            value: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Which devices an update feed covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeviceFilter {
    /// Every registered device
    #[default]
    All,
    /// Only the listed devices
    Only(Vec<DeviceKey>),
}

impl DeviceFilter {
    pub fn matches(&self, key: &DeviceKey) -> bool {
        match self {
            DeviceFilter::All => true,
            DeviceFilter::Only(keys) => keys.contains(key),
        }
    }
}

/// Remote control interface to managed servers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read one attribute
    async fn read_attribute(&self, device: &DeviceKey, attribute: &str) -> Result<AttributeValue, TransportError>;

    /// Write one attribute
    async fn write_attribute(&self, device: &DeviceKey, attribute: &str, value: Value) -> Result<(), TransportError>;

    /// Execute a command, optionally with an argument
    async fn execute_command(
        &self,
        device: &DeviceKey,
        command: &str,
        args: Option<Value>,
    ) -> Result<(), TransportError>;

    /// Live feed of attribute updates for the filtered devices
    ///
    /// Per-item failures are delivered as `RawUpdate { error, .. }`; the feed
    /// only ends when the transport shuts down.
    async fn stream_attribute_updates(&self, filter: DeviceFilter) -> Result<mpsc::Receiver<RawUpdate>, TransportError>;
}
