//! Event types for the fleet event bus
//!
//! Topics are hierarchical by convention (`<entity>.<facet>.<purpose>`), but
//! routing only knows exact matches and the `*` wildcard.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::DeviceKey;

/// Topic for human-readable log lines
pub const TOPIC_LOG: &str = "log";

/// Topic for human-readable error lines
pub const TOPIC_ERROR: &str = "error";

/// Channel used for log and error lines
pub const CHANNEL_LOG: &str = "log";

/// Channel carrying aggregated Status facets
pub const CHANNEL_STATUS: &str = "fleet.status.subscription";

/// Channel carrying aggregated State facets
pub const CHANNEL_STATE: &str = "fleet.state.subscription";

/// Wildcard pattern sentinel
pub const ANY_TOPIC: &str = "*";

/// Routing key of an event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Subscription filter: everything, or exactly one topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicPattern {
    Any,
    Exact(Topic),
}

impl TopicPattern {
    pub fn matches(&self, topic: &Topic) -> bool {
        match self {
            TopicPattern::Any => true,
            TopicPattern::Exact(expected) => expected == topic,
        }
    }
}

impl From<&str> for TopicPattern {
    fn from(s: &str) -> Self {
        if s == ANY_TOPIC {
            TopicPattern::Any
        } else {
            TopicPattern::Exact(Topic::from(s))
        }
    }
}

impl From<String> for TopicPattern {
    fn from(s: String) -> Self {
        TopicPattern::from(s.as_str())
    }
}

impl From<Topic> for TopicPattern {
    fn from(topic: Topic) -> Self {
        TopicPattern::from(topic.0)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicPattern::Any => f.write_str(ANY_TOPIC),
            TopicPattern::Exact(topic) => write!(f, "{}", topic),
        }
    }
}

/// A published event; immutable once dispatched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: Topic,
    pub payload: Value,
    pub channel: String,
    /// Device the event describes, for events derived from device updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DeviceKey>,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Event stamped with the current time
    pub fn new(topic: impl Into<Topic>, payload: impl Into<Value>, channel: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            channel: channel.into(),
            source: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: DeviceKey) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
