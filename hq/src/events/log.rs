//! Bounded rolling log of delivered events
//!
//! New entries go in at the head, the oldest fall off the tail once capacity
//! is reached. [`LogRecorder`] wires a log to an [`EventBus`].

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::bus::{EventBus, SubscriptionHandle};
use super::types::{Event, TopicPattern};
use crate::domain::{ServerRegistry, value_to_text};

/// Default number of retained entries
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Largest capacity accepted by configuration
pub const MAX_LOG_CAPACITY: usize = 500;

/// One displayable history line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub name: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(name: impl Into<String>, data: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            data,
            timestamp,
        }
    }

    /// Derive an entry from an event, resolving the source device to its display name
    pub fn from_event(event: &Event, registry: &ServerRegistry) -> Self {
        let name = match &event.source {
            Some(key) => registry.resolve_name(key),
            None => event.topic.to_string(),
        };
        Self::new(name, event.payload.clone(), event.timestamp)
    }

    /// Payload as display text; strings unquoted, null as empty
    pub fn text(&self) -> String {
        match &self.data {
            Value::Null => String::new(),
            other => value_to_text(other),
        }
    }
}

/// Fixed-capacity, most-recent-first history
#[derive(Debug)]
pub struct BoundedRollingLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl BoundedRollingLog {
    /// Create a log holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!(capacity, "BoundedRollingLog::new: called");
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Insert at the head, evicting from the tail when over capacity
    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.entries.lock();
        entries.push_front(entry);
        if entries.len() > self.capacity {
            entries.pop_back();
        }
    }

    /// Current contents, newest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        debug!("BoundedRollingLog::clear: called");
        self.entries.lock().clear();
    }
}

impl Default for BoundedRollingLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

/// Subscription feeding a [`BoundedRollingLog`] from an [`EventBus`]
pub struct LogRecorder {
    bus: Arc<EventBus>,
    handle: SubscriptionHandle,
}

impl LogRecorder {
    /// Record every event matching `pattern` into `log`
    pub fn attach(
        bus: Arc<EventBus>,
        log: Arc<BoundedRollingLog>,
        registry: Arc<ServerRegistry>,
        pattern: impl Into<TopicPattern>,
    ) -> Self {
        let pattern = pattern.into();
        debug!(%pattern, "LogRecorder::attach: called");
        let handle = bus.subscribe(pattern, move |event: &Event| {
            log.push(LogEntry::from_event(event, &registry));
            Ok(())
        });
        Self { bus, handle }
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Stop recording
    pub fn detach(self) {
        debug!(handle = ?self.handle, "LogRecorder::detach: called");
        self.bus.unsubscribe(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeviceKey, ManagedServerRecord};
    use crate::events::types::{ANY_TOPIC, CHANNEL_LOG, CHANNEL_STATE};
    use proptest::prelude::*;

    fn entry(i: usize) -> LogEntry {
        LogEntry::new(format!("e{}", i), Value::from(i), Utc::now())
    }

    fn names(log: &BoundedRollingLog) -> Vec<String> {
        log.entries().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_new_entries_appear_at_head() {
        let log = BoundedRollingLog::new(5);
        log.push(entry(1));
        log.push(entry(2));
        assert_eq!(names(&log), vec!["e2", "e1"]);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let log = BoundedRollingLog::new(3);
        for i in 0..5 {
            log.push(entry(i));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(names(&log), vec!["e4", "e3", "e2"]);
    }

    #[test]
    fn test_entry_text() {
        let at = Utc::now();
        assert_eq!(LogEntry::new("a", Value::from("RUNNING"), at).text(), "RUNNING");
        assert_eq!(LogEntry::new("a", Value::from(3), at).text(), "3");
        assert_eq!(LogEntry::new("a", Value::Null, at).text(), "");
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let log = BoundedRollingLog::new(0);
        log.push(entry(1));
        log.push(entry(2));
        assert_eq!(log.capacity(), 1);
        assert_eq!(names(&log), vec!["e2"]);
    }

    #[test]
    fn test_recorder_resolves_source_names() {
        let bus = Arc::new(EventBus::new(16));
        let log = Arc::new(BoundedRollingLog::new(10));
        let key = DeviceKey::new("h1", "d1");
        let registry = Arc::new(ServerRegistry::new(vec![ManagedServerRecord::new(key.clone(), "Camel")]));
        let _recorder = LogRecorder::attach(bus.clone(), log.clone(), registry, ANY_TOPIC);

        bus.publish_event(Event::new("Camel.State", "ON", CHANNEL_STATE).with_source(key));
        bus.publish("log", "plain line", CHANNEL_LOG);

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "log");
        assert_eq!(entries[0].data, Value::from("plain line"));
        assert_eq!(entries[1].name, "Camel");
        assert_eq!(entries[1].data, Value::from("ON"));
    }

    #[test]
    fn test_recorder_detach_stops_recording() {
        let bus = Arc::new(EventBus::new(16));
        let log = Arc::new(BoundedRollingLog::new(10));
        let recorder = LogRecorder::attach(bus.clone(), log.clone(), Arc::new(ServerRegistry::default()), ANY_TOPIC);

        recorder.detach();
        bus.publish("log", "dropped", CHANNEL_LOG);

        assert!(log.is_empty());
    }

    /// `publishers` tasks each publish `per_publisher` events into a recorded log
    async fn record_concurrently(capacity: usize, publishers: usize, per_publisher: usize) -> Vec<LogEntry> {
        let bus = Arc::new(EventBus::new(16));
        let log = Arc::new(BoundedRollingLog::new(capacity));
        let _recorder = LogRecorder::attach(bus.clone(), log.clone(), Arc::new(ServerRegistry::default()), ANY_TOPIC);

        let tasks: Vec<_> = (0..publishers)
            .map(|p| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    for i in 0..per_publisher {
                        bus.publish(format!("p{}", p), i, CHANNEL_LOG);
                        if i % 10 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        log.entries()
    }

    fn assert_per_publisher_order(entries: &[LogEntry], prefix: &str, publishers: usize) {
        for p in 0..publishers {
            let name = format!("{}{}", prefix, p);
            // entries are newest first
            let sequence: Vec<u64> = entries
                .iter()
                .rev()
                .filter(|e| e.name == name)
                .map(|e| e.data.as_u64().unwrap())
                .collect();
            assert!(
                sequence.windows(2).all(|w| w[0] < w[1]),
                "publisher {} out of order: {:?}",
                name,
                sequence
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers_fill_log() {
        let entries = record_concurrently(500, 8, 50).await;
        assert_eq!(entries.len(), 400);
        assert_per_publisher_order(&entries, "p", 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers_overflow_log() {
        let entries = record_concurrently(100, 8, 50).await;
        assert_eq!(entries.len(), 100);
        assert_per_publisher_order(&entries, "p", 8);
    }

    #[test]
    fn test_concurrent_push_keeps_capacity() {
        let log = BoundedRollingLog::new(64);
        std::thread::scope(|scope| {
            for t in 0..4 {
                let log = &log;
                scope.spawn(move || {
                    for i in 0..100 {
                        log.push(LogEntry::new(format!("t{}", t), Value::from(i), Utc::now()));
                    }
                });
            }
        });

        let entries = log.entries();
        assert_eq!(entries.len(), 64);
        assert_per_publisher_order(&entries, "t", 4);
    }

    proptest! {
        #[test]
        fn prop_log_keeps_most_recent_in_order(capacity in 1usize..50, total in 0usize..200) {
            let log = BoundedRollingLog::new(capacity);
            for i in 0..total {
                log.push(entry(i));
            }

            let kept = names(&log);
            prop_assert!(kept.len() <= capacity);

            let expected: Vec<String> = (0..total).rev().take(capacity).map(|i| format!("e{}", i)).collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
