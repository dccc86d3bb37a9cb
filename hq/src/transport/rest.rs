//! HTTP transport against a Tango REST style gateway
//!
//! Paths follow `{base}/hosts/{host}/{port}/devices/{device}/...`; a device key
//! host of `localhost:10000` becomes `hosts/localhost/10000`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::debug;

use super::poller::{AttributePoller, DEFAULT_POLL_INTERVAL_MS};
use super::{AttributeValue, DeviceFilter, Transport, TransportError};
use crate::domain::{DeviceKey, RawUpdate};

const DEFAULT_TANGO_PORT: &str = "10000";

/// Error body returned by the gateway
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    description: String,
}

impl ErrorBody {
    fn message(&self) -> Option<String> {
        self.errors.first().map(|e| {
            if e.description.is_empty() {
                e.reason.clone()
            } else {
                format!("{}: {}", e.reason, e.description)
            }
        })
    }
}

/// reqwest-backed [`Transport`]
///
/// The update feed is served by polling State/Status of the configured fleet.
#[derive(Clone)]
pub struct RestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    fleet: Vec<DeviceKey>,
    poll_interval: Duration,
}

impl RestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(%base_url, ?timeout, "RestTransport::new: called");
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            timeout,
            fleet: Vec::new(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        })
    }

    /// Devices and cadence used to serve [`Transport::stream_attribute_updates`]
    pub fn with_fleet(mut self, fleet: Vec<DeviceKey>, poll_interval: Duration) -> Self {
        self.fleet = fleet;
        self.poll_interval = poll_interval;
        self
    }

    fn device_url(&self, device: &DeviceKey) -> String {
        let (host, port) = device.host().split_once(':').unwrap_or((device.host(), DEFAULT_TANGO_PORT));
        format!("{}/hosts/{}/{}/devices/{}", self.base_url, host, port, device.device())
    }

    fn attribute_url(&self, device: &DeviceKey, attribute: &str) -> String {
        format!("{}/attributes/{}/value", self.device_url(device), attribute)
    }

    fn command_url(&self, device: &DeviceKey, command: &str) -> String {
        format!("{}/commands/{}", self.device_url(device), command)
    }

    /// Turn a non-success response into a device error carrying the gateway message
    async fn check(device: &DeviceKey, response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message())
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        debug!(%device, %status, %message, "RestTransport::check: call rejected");
        Err(TransportError::device(device, message))
    }

    fn map_send_error(err: reqwest::Error, timeout: Duration) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else {
            TransportError::Request(err)
        }
    }
}

#[async_trait]
impl Transport for RestTransport {
    async fn read_attribute(&self, device: &DeviceKey, attribute: &str) -> Result<AttributeValue, TransportError> {
        let url = self.attribute_url(device, attribute);
        debug!(%url, "RestTransport::read_attribute: called");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, self.timeout))?;

        if !response.status().is_success() {
            // A rejected read is reported as a failed value, not a failed call
            return match Self::check(device, response).await {
                Err(TransportError::Device { message, .. }) => Ok(AttributeValue::failed(message)),
                Err(other) => Err(other),
                Ok(_) => Err(TransportError::Decode("unexpected success".to_string())),
            };
        }

        response
            .json::<AttributeValue>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn write_attribute(&self, device: &DeviceKey, attribute: &str, value: Value) -> Result<(), TransportError> {
        let url = self.attribute_url(device, attribute);
        debug!(%url, "RestTransport::write_attribute: called");
        let v = match value {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let response = self
            .client
            .put(&url)
            .query(&[("v", v)])
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, self.timeout))?;
        Self::check(device, response).await?;
        Ok(())
    }

    async fn execute_command(
        &self,
        device: &DeviceKey,
        command: &str,
        args: Option<Value>,
    ) -> Result<(), TransportError> {
        let url = self.command_url(device, command);
        debug!(%url, has_args = args.is_some(), "RestTransport::execute_command: called");
        let mut request = self.client.put(&url);
        if let Some(input) = args {
            request = request.json(&json!({ "input": input }));
        }
        let response = request
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, self.timeout))?;
        Self::check(device, response).await?;
        Ok(())
    }

    async fn stream_attribute_updates(&self, filter: DeviceFilter) -> Result<mpsc::Receiver<RawUpdate>, TransportError> {
        let devices: Vec<DeviceKey> = self.fleet.iter().filter(|k| filter.matches(k)).cloned().collect();
        debug!(count = devices.len(), "RestTransport::stream_attribute_updates: called");
        let (tx, rx) = mpsc::channel(devices.len().max(1) * 4);
        let poller = AttributePoller::new(Arc::new(self.clone()), devices, self.poll_interval);
        poller.spawn(tx);
        Ok(rx)
    }
}
