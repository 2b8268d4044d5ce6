//! Type-keyed publish/subscribe registry for inbound server events.
//!
//! The dispatcher outlives individual connections; screens subscribe and
//! unsubscribe independently of connection state. Each `subscribe` returns
//! a `Subscription` handle identifying exactly that registration, so
//! unsubscribing removes only it and is idempotent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

/// Callback invoked with the payload of a dispatched event.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle to a single registration, returned by `subscribe`.
///
/// Dropping the handle does not unsubscribe; pass it back to
/// `unsubscribe` to detach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    message_type: String,
    id: u64,
}

impl Subscription {
    /// Event type this subscription is registered for.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }
}

type Registry = HashMap<String, Vec<(u64, EventCallback)>>;

/// Fan-out router from event-type strings to registered callbacks.
#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<RwLock<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a callback for an event type.
    ///
    /// A type may have any number of simultaneous subscribers; each call
    /// registers independently even for an identical callback.
    pub fn subscribe<F>(&self, message_type: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.registry.write().unwrap();
        registry
            .entry(message_type.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        debug!("subscribed to '{message_type}' (id {id})");
        Subscription {
            message_type: message_type.to_string(),
            id,
        }
    }

    /// Remove exactly the registration behind the handle.
    ///
    /// Unsubscribing an already-removed handle is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut registry = self.registry.write().unwrap();
        if let Some(callbacks) = registry.get_mut(&subscription.message_type) {
            callbacks.retain(|(id, _)| *id != subscription.id);
            if callbacks.is_empty() {
                registry.remove(&subscription.message_type);
            }
        }
    }

    /// Invoke every callback currently registered for the type.
    ///
    /// A type with no subscribers is a no-op. Delivery order across
    /// subscribers is unspecified. No deduplication by message identity is
    /// performed; consumers of redeliverable events handle idempotency
    /// themselves.
    pub fn dispatch(&self, message_type: &str, payload: &Value) {
        // Snapshot the callbacks so handlers can subscribe/unsubscribe
        // reentrantly without deadlocking the registry.
        let callbacks: Vec<EventCallback> = {
            let registry = self.registry.read().unwrap();
            match registry.get(message_type) {
                Some(entries) => entries.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => {
                    debug!("no subscribers for '{message_type}'");
                    return;
                }
            }
        };
        debug!(
            "dispatching '{message_type}' to {} subscriber(s)",
            callbacks.len()
        );
        for callback in callbacks {
            callback(payload);
        }
    }

    /// Number of callbacks registered for a type.
    pub fn subscriber_count(&self, message_type: &str) -> usize {
        self.registry
            .read()
            .unwrap()
            .get(message_type)
            .map_or(0, Vec::len)
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_multiple_subscribers_same_type() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = {
            let seen = Arc::clone(&seen);
            dispatcher.subscribe("chat", move |_| seen.lock().unwrap().push("a"))
        };
        let _s2 = {
            let seen = Arc::clone(&seen);
            dispatcher.subscribe("chat", move |_| seen.lock().unwrap().push("b"))
        };

        dispatcher.dispatch("chat", &json!({"message": "hi"}));
        assert_eq!(seen.lock().unwrap().len(), 2);

        // Removing one leaves the other attached.
        dispatcher.unsubscribe(&s1);
        dispatcher.dispatch("chat", &json!({"message": "again"}));
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(dispatcher.subscriber_count("chat"), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let dispatcher = EventDispatcher::new();
        let sub = dispatcher.subscribe("match", |_| {});
        dispatcher.unsubscribe(&sub);
        dispatcher.unsubscribe(&sub);
        assert_eq!(dispatcher.subscriber_count("match"), 0);
    }

    #[test]
    fn test_unsubscribed_callback_not_invoked() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(Mutex::new(0));

        let sub = {
            let hits = Arc::clone(&hits);
            dispatcher.subscribe("profile_response", move |_| *hits.lock().unwrap() += 1)
        };
        let keep = Arc::new(Mutex::new(0));
        let _other = {
            let keep = Arc::clone(&keep);
            dispatcher.subscribe("profile_response", move |_| *keep.lock().unwrap() += 1)
        };

        dispatcher.unsubscribe(&sub);
        dispatcher.dispatch("profile_response", &json!({"success": true}));

        assert_eq!(*hits.lock().unwrap(), 0);
        assert_eq!(*keep.lock().unwrap(), 1);
    }

    #[test]
    fn test_dispatch_unknown_type_is_noop() {
        let dispatcher = EventDispatcher::new();
        dispatcher.dispatch("nonexistent_type", &json!({"anything": 1}));
    }

    #[test]
    fn test_callback_receives_payload() {
        let dispatcher = EventDispatcher::new();
        let got = Arc::new(Mutex::new(None));
        let _sub = {
            let got = Arc::clone(&got);
            dispatcher.subscribe("chat", move |payload| {
                *got.lock().unwrap() = Some(payload.clone());
            })
        };

        dispatcher.dispatch("chat", &json!({"match_id": 5, "message": "yo"}));
        let payload = got.lock().unwrap().clone().unwrap();
        assert_eq!(payload["match_id"], 5);
    }

    #[test]
    fn test_reentrant_unsubscribe_from_handler() {
        let dispatcher = EventDispatcher::new();
        let inner = EventDispatcher::clone(&dispatcher);
        let sub = Arc::new(Mutex::new(None::<Subscription>));

        let handle = {
            let sub = Arc::clone(&sub);
            dispatcher.subscribe("match_removed", move |_| {
                if let Some(s) = sub.lock().unwrap().take() {
                    inner.unsubscribe(&s);
                }
            })
        };
        *sub.lock().unwrap() = Some(handle);

        // Must not deadlock; second dispatch is then a no-op.
        dispatcher.dispatch("match_removed", &json!({"match_id": 1}));
        assert_eq!(dispatcher.subscriber_count("match_removed"), 0);
        dispatcher.dispatch("match_removed", &json!({"match_id": 2}));
    }
}
