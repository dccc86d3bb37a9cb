//! Attribute poller
//!
//! Turns the request/response read interface into an update feed: every
//! interval each device's State and Status are read and pushed as
//! [`RawUpdate`]s. A failed read becomes an update carrying the error.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use super::Transport;
use crate::domain::{DeviceKey, RawUpdate, STATE_ATTRIBUTE, STATUS_ATTRIBUTE};

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Attributes read on every poll
pub const DEFAULT_POLLED_ATTRIBUTES: [&str; 2] = [STATE_ATTRIBUTE, STATUS_ATTRIBUTE];

pub struct AttributePoller {
    transport: Arc<dyn Transport>,
    devices: Vec<DeviceKey>,
    attributes: Vec<String>,
    period: Duration,
}

impl AttributePoller {
    /// Poll State and Status of `devices` every `period`
    pub fn new(transport: Arc<dyn Transport>, devices: Vec<DeviceKey>, period: Duration) -> Self {
        debug!(devices = devices.len(), ?period, "AttributePoller::new: called");
        Self {
            transport,
            devices,
            attributes: DEFAULT_POLLED_ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
            period,
        }
    }

    /// Replace the polled attribute list
    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Read every (device, attribute) pair once, concurrently
    ///
    /// Results come back in device order, then attribute order.
    pub async fn poll_once(&self) -> Vec<RawUpdate> {
        let reads = self.devices.iter().flat_map(|device| {
            self.attributes.iter().map(move |attribute| async move {
                match self.transport.read_attribute(device, attribute).await {
                    Ok(read) => RawUpdate::for_key(device, attribute.as_str(), read.value, read.error),
                    Err(e) => {
                        debug!(%device, %attribute, error = %e, "AttributePoller::poll_once: read failed");
                        RawUpdate::for_key(device, attribute.as_str(), serde_json::Value::Null, Some(e.to_string()))
                    }
                }
            })
        });
        join_all(reads).await
    }

    /// Poll until the receiving side of `tx` is dropped
    pub async fn run(self, tx: mpsc::Sender<RawUpdate>) {
        info!(devices = self.devices.len(), period = ?self.period, "AttributePoller started");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tx.closed() => {
                    info!("AttributePoller: feed closed, stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }
            for update in self.poll_once().await {
                if tx.send(update).await.is_err() {
                    info!("AttributePoller: feed closed, stopping");
                    return;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) as a background task
    pub fn spawn(self, tx: mpsc::Sender<RawUpdate>) -> JoinHandle<()> {
        tokio::spawn(self.run(tx))
    }
}
