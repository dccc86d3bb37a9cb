//! Window buffer: collects updates for one window and folds them per device

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::domain::{AggregatedSnapshot, DeviceKey, RawUpdate};

/// A raw update that cannot be aggregated; dropped, never fatal
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("Malformed update: {reason}")]
    Malformed { reason: String },
}

/// Updates received since the last window close, in arrival order
#[derive(Debug, Default)]
pub struct WindowBuffer {
    updates: Vec<RawUpdate>,
}

impl WindowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an update into the open window
    pub fn push(&mut self, update: RawUpdate) -> Result<(), AggregationError> {
        validate(&update)?;
        self.updates.push(update);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Close the window at `at`: one snapshot per device, in order of each
    /// device's first update
    ///
    /// Updates are folded in arrival order so the last value per attribute
    /// wins. Devices that only saw attributes other than State/Status yield
    /// nothing. The buffer is empty afterwards.
    pub fn close(&mut self, at: DateTime<Utc>) -> Vec<AggregatedSnapshot> {
        let updates = std::mem::take(&mut self.updates);
        debug!(count = updates.len(), "WindowBuffer::close: called");

        let mut order: Vec<DeviceKey> = Vec::new();
        let mut groups: HashMap<DeviceKey, AggregatedSnapshot> = HashMap::new();

        for update in &updates {
            let key = update.key();
            let snapshot = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                AggregatedSnapshot::empty(&key, at)
            });
            snapshot.apply(update);
        }

        order
            .into_iter()
            .filter_map(|key| groups.remove(&key))
            .filter(|snapshot| !snapshot.is_empty())
            .collect()
    }
}

fn validate(update: &RawUpdate) -> Result<(), AggregationError> {
    let missing = if update.host.trim().is_empty() {
        Some("host")
    } else if update.device.trim().is_empty() {
        Some("device")
    } else if update.attribute_name.trim().is_empty() {
        Some("attribute name")
    } else {
        None
    };
    match missing {
        Some(field) => Err(AggregationError::Malformed {
            reason: format!("empty {}", field),
        }),
        None => Ok(()),
    }
}
