//! FleetHQ - supervisor for a fleet of instrument-control servers
//!
//! FleetHQ watches a set of managed servers, condenses their State/Status
//! chatter into one snapshot per device per window, and drives fleet-wide
//! update-and-restart sequences.
//!
//! # Modules
//!
//! - [`events`] - topic-routed event bus and bounded rolling log
//! - [`aggregator`] - windowed per-device reduction of raw attribute updates
//! - [`orchestrator`] - fail-fast remote command sequences
//! - [`transport`] - remote control transport trait, REST client and poller
//! - [`domain`] - device keys, updates, snapshots and the server registry
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod domain;
pub mod events;
pub mod orchestrator;
pub mod transport;

// Re-export commonly used types
pub use aggregator::{AggregatorStats, UpdateAggregator};
pub use config::Config;
pub use domain::{AggregatedSnapshot, DeviceKey, ManagedServerRecord, RawUpdate, ServerRegistry};
pub use events::{BoundedRollingLog, Event, EventBus, LogEntry, LogRecorder, SubscriptionHandle, TopicPattern};
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorState, SequenceStep};
pub use transport::{AttributeValue, DeviceFilter, RestTransport, Transport, TransportError};
