//! Attribute updates and per-window snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DeviceKey;

/// Attribute carrying the device state (`RUNNING`, `ON`, `FAULT`, ...)
pub const STATE_ATTRIBUTE: &str = "State";

/// Attribute carrying the free-form device status line
pub const STATUS_ATTRIBUTE: &str = "Status";

/// One observation of one attribute on one device, as emitted by the transport
///
/// A failed read carries `error` instead of a meaningful `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawUpdate {
    pub host: String,
    pub device: String,
    #[serde(rename = "name")]
    pub attribute_name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RawUpdate {
    /// Successful observation
    pub fn value(
        host: impl Into<String>,
        device: impl Into<String>,
        attribute_name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            host: host.into(),
            device: device.into(),
            attribute_name: attribute_name.into(),
            value: value.into(),
            error: None,
        }
    }

    /// Failed observation
    pub fn error(
        host: impl Into<String>,
        device: impl Into<String>,
        attribute_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            device: device.into(),
            attribute_name: attribute_name.into(),
            value: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Build an observation for a known device key
    pub fn for_key(key: &DeviceKey, attribute_name: impl Into<String>, value: Value, error: Option<String>) -> Self {
        Self {
            host: key.host().to_string(),
            device: key.device().to_string(),
            attribute_name: attribute_name.into(),
            value,
            error,
        }
    }

    /// Grouping key (`host/device`)
    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.host.clone(), self.device.clone())
    }

    /// Value used downstream: an error always replaces the value with an
    /// `ERROR: <message>` sentinel
    pub fn effective_value(&self) -> Value {
        match &self.error {
            Some(message) => Value::String(format!("ERROR: {}", message)),
            None => self.value.clone(),
        }
    }

    pub fn is_state(&self) -> bool {
        self.attribute_name.eq_ignore_ascii_case(STATE_ATTRIBUTE)
    }

    pub fn is_status(&self) -> bool {
        self.attribute_name.eq_ignore_ascii_case(STATUS_ATTRIBUTE)
    }
}

/// Per-device reduction of all updates observed within one aggregation window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedSnapshot {
    pub host: String,
    pub device: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AggregatedSnapshot {
    /// Empty snapshot for a device, stamped with the window close time
    pub fn empty(key: &DeviceKey, timestamp: DateTime<Utc>) -> Self {
        Self {
            host: key.host().to_string(),
            device: key.device().to_string(),
            state: None,
            status: None,
            timestamp,
        }
    }

    pub fn key(&self) -> DeviceKey {
        DeviceKey::new(self.host.clone(), self.device.clone())
    }

    /// True when no State or Status update contributed to this snapshot
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.status.is_none()
    }

    /// Fold one update into the snapshot; later calls overwrite earlier ones
    ///
    /// Returns false when the attribute is neither State nor Status.
    pub fn apply(&mut self, update: &RawUpdate) -> bool {
        let value = value_to_text(&update.effective_value());
        if update.is_state() {
            self.state = Some(value);
            true
        } else if update.is_status() {
            self.status = Some(value);
            true
        } else {
            false
        }
    }
}

/// Display text for an attribute that was read but carried no value
pub const UNKNOWN_VALUE: &str = "UNKNOWN";

/// Render an attribute value as display text; strings are taken verbatim
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => UNKNOWN_VALUE.to_string(),
        other => other.to_string(),
    }
}
