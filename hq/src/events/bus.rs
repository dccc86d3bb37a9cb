//! Event Bus - topic-addressed pub/sub for fleet events
//!
//! Handlers registered with [`EventBus::subscribe`] are invoked synchronously
//! on the publishing task, in registration order. Async consumers can instead
//! take a broadcast receiver via [`EventBus::receiver`] and filter themselves.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::{Event, Topic, TopicPattern};

/// Default broadcast channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Callback invoked for every matching event
///
/// An `Err` is logged and otherwise ignored; it never reaches the publisher.
pub type Handler = Arc<dyn Fn(&Event) -> eyre::Result<()> + Send + Sync>;

/// Returned by [`EventBus::subscribe`]; pass to [`EventBus::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

/// Events published by handlers while a delivery is in progress
#[derive(Default)]
struct Delivery {
    active: bool,
    pending: VecDeque<Event>,
}

struct Subscriber {
    handle: SubscriptionHandle,
    pattern: TopicPattern,
    handler: Handler,
}

/// Central event bus for fleet state, log lines and orchestration outcomes
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    subscribers: RwLock<Vec<Subscriber>>,
    // Serializes deliveries across threads; reentrant so a handler may publish,
    // in which case the event is queued behind the one being delivered.
    delivery: ReentrantMutex<RefCell<Delivery>>,
}

impl EventBus {
    /// Create a new event bus with the given broadcast capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            subscribers: RwLock::new(Vec::new()),
            delivery: ReentrantMutex::new(RefCell::new(Delivery::default())),
        }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Register `handler` for every event whose topic matches `pattern`
    ///
    /// The handler stays registered until [`unsubscribe`](Self::unsubscribe)
    /// is called or the bus is dropped.
    pub fn subscribe<F>(&self, pattern: impl Into<TopicPattern>, handler: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> eyre::Result<()> + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        let handle = SubscriptionHandle(Uuid::now_v7());
        debug!(%pattern, ?handle, "EventBus::subscribe: new subscriber");
        self.subscribers.write().push(Subscriber {
            handle,
            pattern,
            handler: Arc::new(handler),
        });
        handle
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.handle != handle);
        let removed = subscribers.len() != before;
        debug!(?handle, removed, "EventBus::unsubscribe");
        removed
    }

    /// Publish a payload on a topic, stamped with the current time
    pub fn publish(&self, topic: impl Into<Topic>, payload: impl Into<Value>, channel: impl Into<String>) {
        self.publish_event(Event::new(topic, payload, channel));
    }

    /// Deliver a pre-built event to every matching subscriber
    ///
    /// Returns the number of handlers that accepted the event. Failing or
    /// panicking handlers are logged and skipped. An event published from
    /// inside a handler is queued and delivered after the current one, so
    /// every subscriber sees events in publish order; that nested call
    /// returns 0.
    pub fn publish_event(&self, event: Event) -> usize {
        let delivery = self.delivery.lock();
        {
            let mut state = delivery.borrow_mut();
            if state.active {
                debug!(topic = %event.topic, "EventBus::publish_event: queued behind current delivery");
                state.pending.push_back(event);
                return 0;
            }
            state.active = true;
        }

        let delivered = self.deliver(event);
        loop {
            let next = delivery.borrow_mut().pending.pop_front();
            match next {
                Some(queued) => {
                    self.deliver(queued);
                }
                None => break,
            }
        }
        delivery.borrow_mut().active = false;
        delivered
    }

    fn deliver(&self, event: Event) -> usize {
        debug!(topic = %event.topic, channel = %event.channel, "EventBus::deliver");

        // Snapshot the matching handlers so they may (un)subscribe while running
        let handlers: Vec<(SubscriptionHandle, Handler)> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.pattern.matches(&event.topic))
            .map(|s| (s.handle, s.handler.clone()))
            .collect();

        let mut delivered = 0;
        for (handle, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(?handle, topic = %event.topic, error = %e, "EventBus: subscriber failed");
                }
                Err(_) => {
                    warn!(?handle, topic = %event.topic, "EventBus: subscriber panicked");
                }
            }
        }

        // No broadcast receivers is fine
        let _ = self.tx.send(event);
        delivered
    }

    /// Receiver of every event published after this call
    pub fn receiver(&self) -> broadcast::Receiver<Event> {
        debug!("EventBus::receiver: new broadcast receiver");
        self.tx.subscribe()
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus(capacity: usize) -> Arc<EventBus> {
    Arc::new(EventBus::new(capacity))
}
