//! Transport error types

use std::time::Duration;
use thiserror::Error;

/// Errors from remote attribute or command calls
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Device {device} rejected the call: {message}")]
    Device { device: String, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Update feed closed")]
    ChannelClosed,
}

impl TransportError {
    /// Build a device-side rejection
    pub fn device(device: impl ToString, message: impl Into<String>) -> Self {
        TransportError::Device {
            device: device.to_string(),
            message: message.into(),
        }
    }

    /// Whether the failure happened before the device answered
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Request(_) | TransportError::Timeout(_))
    }
}
