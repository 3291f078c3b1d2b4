//! Per-session event listener registry.
//!
//! Extension commands need to observe browser events without stealing them
//! from the client's own subscriptions, so the correlator publishes each
//! event here *and* forwards it north. Listeners are bounded queues; a full
//! queue drops the event rather than ever blocking the correlator.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

// ============================================================================
// Constants
// ============================================================================

/// Capacity of each listener queue.
///
/// One in-flight extension command consumes at most a couple of navigation
/// events; overflow means the consumer is gone or stuck, and dropping is
/// the contract.
pub const EVENT_QUEUE_CAPACITY: usize = 10;

// ============================================================================
// EventListener
// ============================================================================

/// Receiving end of one registered listener queue.
///
/// The tag is the queue's identity; [`EventListenerRegistry::remove`]
/// matches on it, then closes the queue by dropping both ends.
pub struct EventListener {
    tag: u64,
    method: String,
    rx: mpsc::Receiver<Value>,
}

impl EventListener {
    /// Receives the next event frame.
    ///
    /// Returns `None` once the queue has been removed from the registry
    /// and drained.
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Returns the event method this listener is registered for.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

// ============================================================================
// EventListenerRegistry
// ============================================================================

/// One registered queue's sending side.
struct ListenerSlot {
    tag: u64,
    tx: mpsc::Sender<Value>,
}

/// Registry of `method → listener queues` for one session.
///
/// Single producer (the correlator), one consumer per registered queue
/// (the extension command that added it). All operations are O(n) in the
/// listener list for a method; n is one per in-flight extension command.
pub struct EventListenerRegistry {
    inner: Mutex<FxHashMap<String, Vec<ListenerSlot>>>,
    next_tag: AtomicU64,
}

impl EventListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FxHashMap::default()),
            next_tag: AtomicU64::new(1),
        }
    }

    /// Registers a new bounded queue for `method`.
    #[must_use]
    pub fn add(&self, method: &str) -> EventListener {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        inner
            .entry(method.to_string())
            .or_default()
            .push(ListenerSlot { tag, tx });

        trace!(method, tag, "event listener added");

        EventListener {
            tag,
            method: method.to_string(),
            rx,
        }
    }

    /// Removes a listener and closes its queue.
    ///
    /// Dropping the slot's sender together with the consumed receiver is
    /// what closes the queue; nothing else in the session may do that.
    pub fn remove(&self, listener: EventListener) {
        let mut inner = self.inner.lock();
        if let Some(slots) = inner.get_mut(&listener.method) {
            slots.retain(|slot| slot.tag != listener.tag);
            if slots.is_empty() {
                inner.remove(&listener.method);
            }
        }

        trace!(method = %listener.method, tag = listener.tag, "event listener removed");
    }

    /// Offers an event frame to every queue registered for `method`.
    ///
    /// The listener list is snapshotted under the lock and the lock
    /// released before any send; full queues drop the frame.
    pub fn publish(&self, method: &str, frame: &Value) {
        let targets: Vec<mpsc::Sender<Value>> = {
            let inner = self.inner.lock();
            match inner.get(method) {
                Some(slots) => slots.iter().map(|slot| slot.tx.clone()).collect(),
                None => return,
            }
        };

        for tx in targets {
            if tx.try_send(frame.clone()).is_err() {
                trace!(method, "listener queue full, event dropped");
            }
        }
    }

    /// Returns the number of queues registered for `method`.
    #[must_use]
    pub fn listener_count(&self, method: &str) -> usize {
        self.inner.lock().get(method).map_or(0, Vec::len)
    }

    /// Returns `true` if no listeners are registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for EventListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn test_publish_reaches_listener() {
        let registry = EventListenerRegistry::new();
        let mut listener = registry.add("browsingContext.load");

        registry.publish("browsingContext.load", &json!({"method": "browsingContext.load"}));

        let frame = listener.next().await.expect("event");
        assert_eq!(frame["method"], "browsingContext.load");
    }

    #[tokio::test]
    async fn test_publish_other_method_not_delivered() {
        let registry = EventListenerRegistry::new();
        let mut listener = registry.add("browsingContext.load");

        registry.publish("browsingContext.navigationStarted", &json!({"n": 0}));
        registry.publish("browsingContext.load", &json!({"n": 1}));

        // Only the matching method reached the queue.
        assert_eq!(listener.next().await.expect("event")["n"], 1);
    }

    #[tokio::test]
    async fn test_overflow_drops_never_blocks() {
        let registry = EventListenerRegistry::new();
        let mut listener = registry.add("browsingContext.load");

        // Fill past capacity; publish must not block or panic.
        for i in 0..(EVENT_QUEUE_CAPACITY + 5) {
            registry.publish("browsingContext.load", &json!({"n": i}));
        }

        // Exactly the first EVENT_QUEUE_CAPACITY frames survived.
        for i in 0..EVENT_QUEUE_CAPACITY {
            let frame = listener.next().await.expect("event");
            assert_eq!(frame["n"], i);
        }

        registry.remove(listener);
    }

    #[tokio::test]
    async fn test_remove_closes_queue() {
        let registry = EventListenerRegistry::new();
        let first = registry.add("browsingContext.load");
        let second = registry.add("browsingContext.load");
        assert_eq!(registry.listener_count("browsingContext.load"), 2);

        registry.remove(first);
        assert_eq!(registry.listener_count("browsingContext.load"), 1);

        registry.remove(second);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_independent_queues_per_listener() {
        let registry = EventListenerRegistry::new();
        let mut first = registry.add("browsingContext.load");
        let mut second = registry.add("browsingContext.load");

        registry.publish("browsingContext.load", &json!({"n": 1}));

        assert_eq!(first.next().await.expect("event")["n"], 1);
        assert_eq!(second.next().await.expect("event")["n"], 1);
    }
}
