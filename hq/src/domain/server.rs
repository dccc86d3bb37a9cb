//! Managed server registry
//!
//! The registry is supplied by the surrounding application (configuration) and
//! is read-only to the aggregation and orchestration code, which only resolve
//! display names through it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DeviceKey;

/// Device identifier paired with a human readable name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedServerRecord {
    pub identifier: DeviceKey,
    pub display_name: String,
}

impl ManagedServerRecord {
    pub fn new(identifier: DeviceKey, display_name: impl Into<String>) -> Self {
        Self {
            identifier,
            display_name: display_name.into(),
        }
    }
}

/// Lookup table from device key to [`ManagedServerRecord`]
///
/// Iteration order is the order records were supplied in.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    records: Vec<ManagedServerRecord>,
    index: HashMap<DeviceKey, usize>,
}

impl ServerRegistry {
    /// Build a registry; a later record with a duplicate key replaces the earlier one
    pub fn new(records: impl IntoIterator<Item = ManagedServerRecord>) -> Self {
        let mut registry = Self::default();
        for record in records {
            match registry.index.get(&record.identifier) {
                Some(&idx) => {
                    debug!(key = %record.identifier, "ServerRegistry::new: replacing duplicate record");
                    registry.records[idx] = record;
                }
                None => {
                    registry.index.insert(record.identifier.clone(), registry.records.len());
                    registry.records.push(record);
                }
            }
        }
        debug!(count = registry.records.len(), "ServerRegistry::new: built");
        registry
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&ManagedServerRecord> {
        self.index.get(key).map(|&idx| &self.records[idx])
    }

    pub fn contains(&self, key: &DeviceKey) -> bool {
        self.index.contains_key(key)
    }

    /// Display name for a key, if registered
    pub fn display_name(&self, key: &DeviceKey) -> Option<&str> {
        self.get(key).map(|record| record.display_name.as_str())
    }

    /// Display name for a key, falling back to the raw `host/device` string
    pub fn resolve_name(&self, key: &DeviceKey) -> String {
        match self.display_name(key) {
            Some(name) => name.to_string(),
            None => {
                debug!(%key, "ServerRegistry::resolve_name: unknown device, using raw key");
                key.to_string()
            }
        }
    }

    pub fn records(&self) -> &[ManagedServerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
