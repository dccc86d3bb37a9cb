//! Device identity
//!
//! Managed servers are addressed as `{host}/{device}`, where the host part may
//! carry a port (`localhost:10000`) and the device part is itself a slash
//! separated path (`development/xenv/main`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a device key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceKeyError {
    #[error("Device key '{0}' is missing the host/device separator")]
    MissingSeparator(String),

    #[error("Device key '{0}' has an empty host or device part")]
    EmptyPart(String),
}

/// `host/device` identity of a managed server
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceKey {
    host: String,
    device: String,
}

impl DeviceKey {
    /// Build a key from its parts
    pub fn new(host: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            device: device.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.device)
    }
}

impl FromStr for DeviceKey {
    type Err = DeviceKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, device) = s
            .split_once('/')
            .ok_or_else(|| DeviceKeyError::MissingSeparator(s.to_string()))?;
        if host.is_empty() || device.is_empty() {
            return Err(DeviceKeyError::EmptyPart(s.to_string()));
        }
        Ok(Self::new(host, device))
    }
}

impl TryFrom<String> for DeviceKey {
    type Error = DeviceKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceKey> for String {
    fn from(key: DeviceKey) -> Self {
        key.to_string()
    }
}
