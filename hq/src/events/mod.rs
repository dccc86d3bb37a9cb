//! Event bus and rolling history
//!
//! ```text
//!   Aggregator ──┐                       ┌──> LogRecorder ──> BoundedRollingLog
//!                ├──> EventBus (topics) ─┤
//!  Orchestrator ─┘                       └──> any subscriber / broadcast receiver
//! ```
//!
//! Subscribers register a handler against a topic (`"Camel.State"`) or the
//! wildcard `"*"`. Handler failures are contained inside the bus.

mod bus;
mod log;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, Handler, SubscriptionHandle, create_event_bus};
pub use log::{BoundedRollingLog, DEFAULT_LOG_CAPACITY, LogEntry, LogRecorder, MAX_LOG_CAPACITY};
pub use types::{
    ANY_TOPIC, CHANNEL_LOG, CHANNEL_STATE, CHANNEL_STATUS, Event, TOPIC_ERROR, TOPIC_LOG, Topic, TopicPattern,
};
