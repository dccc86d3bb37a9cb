//! UpdateAggregator task
//!
//! Owns the open [`WindowBuffer`]. Updates are buffered as they arrive; a
//! timer closes the window on elapsed wall-clock time only, regardless of how
//! many updates came in.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::window::WindowBuffer;
use crate::domain::{AggregatedSnapshot, RawUpdate, STATE_ATTRIBUTE, STATUS_ATTRIBUTE, ServerRegistry};
use crate::events::{CHANNEL_STATE, CHANNEL_STATUS, Event, EventBus};

/// Default aggregation window
pub const DEFAULT_WINDOW_MS: u64 = 3000;

/// Counters reported when the aggregator stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    pub updates_received: u64,
    pub updates_dropped: u64,
    pub windows_closed: u64,
    pub snapshots_published: u64,
}

/// Time-windowed, per-device reduction of raw updates onto the event bus
pub struct UpdateAggregator {
    bus: Arc<EventBus>,
    registry: Arc<ServerRegistry>,
    window: Duration,
}

impl UpdateAggregator {
    pub fn new(bus: Arc<EventBus>, registry: Arc<ServerRegistry>, window: Duration) -> Self {
        debug!(?window, servers = registry.len(), "UpdateAggregator::new: called");
        Self { bus, registry, window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Consume `rx` until it closes, publishing one snapshot per device per window
    ///
    /// The window open when the feed ends is flushed before returning.
    pub async fn run(self, mut rx: mpsc::Receiver<RawUpdate>) -> AggregatorStats {
        info!(window = ?self.window, "UpdateAggregator started");
        let mut buffer = WindowBuffer::new();
        let mut stats = AggregatorStats::default();
        let mut ticker = interval_at(Instant::now() + self.window, self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(update) => {
                        stats.updates_received += 1;
                        if let Err(e) = buffer.push(update) {
                            warn!(error = %e, "UpdateAggregator: dropping update");
                            stats.updates_dropped += 1;
                        }
                    }
                    None => {
                        debug!("UpdateAggregator: feed closed, flushing open window");
                        self.close_window(&mut buffer, &mut stats);
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.close_window(&mut buffer, &mut stats);
                }
            }
        }

        info!(?stats, "UpdateAggregator stopped");
        stats
    }

    /// Spawn [`run`](Self::run) as a background task
    pub fn spawn(self, rx: mpsc::Receiver<RawUpdate>) -> JoinHandle<AggregatorStats> {
        tokio::spawn(self.run(rx))
    }

    fn close_window(&self, buffer: &mut WindowBuffer, stats: &mut AggregatorStats) {
        if buffer.is_empty() {
            return;
        }
        stats.windows_closed += 1;
        for snapshot in buffer.close(Utc::now()) {
            self.publish_snapshot(&snapshot);
            stats.snapshots_published += 1;
        }
    }

    /// Publish `<name>.Status` then `<name>.State` for one snapshot
    ///
    /// Both events carry the device key as source and the window close time.
    pub fn publish_snapshot(&self, snapshot: &AggregatedSnapshot) {
        let key = snapshot.key();
        let name = self.registry.resolve_name(&key);
        debug!(%key, %name, "UpdateAggregator::publish_snapshot: called");

        let facet = |value: &Option<String>| value.clone().map(Value::String).unwrap_or(Value::Null);

        self.bus.publish_event(
            Event::new(format!("{}.{}", name, STATUS_ATTRIBUTE), facet(&snapshot.status), CHANNEL_STATUS)
                .with_source(key.clone())
                .with_timestamp(snapshot.timestamp),
        );
        self.bus.publish_event(
            Event::new(format!("{}.{}", name, STATE_ATTRIBUTE), facet(&snapshot.state), CHANNEL_STATE)
                .with_source(key)
                .with_timestamp(snapshot.timestamp),
        );
    }
}
