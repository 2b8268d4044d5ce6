//! FIFO buffer for outbound envelopes awaiting a live connection.
//!
//! The queue itself is not synchronized; it is owned by the connection
//! manager and only touched under the manager's state lock, which is what
//! makes `flush` atomic relative to the connected-state transition.

use std::collections::VecDeque;

use tracing::debug;

use crate::envelope::MessageEnvelope;

/// Ordered queue of envelopes awaiting transmission.
#[derive(Debug, Default)]
pub struct MessageQueue {
    entries: VecDeque<MessageEnvelope>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an envelope to the tail.
    pub fn enqueue(&mut self, envelope: MessageEnvelope) {
        debug!(
            "queueing '{}' message ({} now pending)",
            envelope.message_type,
            self.entries.len() + 1
        );
        self.entries.push_back(envelope);
    }

    /// Transmit every queued envelope in insertion order, then clear.
    ///
    /// The transmit closure runs synchronously for each entry; a failed
    /// transmit does not re-queue (the transport layer owns delivery once
    /// the connection is live).
    pub fn flush<F>(&mut self, mut transmit: F)
    where
        F: FnMut(&MessageEnvelope),
    {
        if self.entries.is_empty() {
            return;
        }
        debug!("flushing {} queued message(s)", self.entries.len());
        for envelope in self.entries.iter() {
            transmit(envelope);
        }
        self.entries.clear();
    }

    /// Drop all queued envelopes.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!("clearing {} queued message(s)", self.entries.len());
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(n: i64) -> MessageEnvelope {
        MessageEnvelope::new("chat", json!({"match_id": n, "message": format!("m{n}")}))
    }

    #[test]
    fn test_flush_preserves_insertion_order_and_clears() {
        let mut queue = MessageQueue::new();
        queue.enqueue(envelope(1));
        queue.enqueue(envelope(2));
        queue.enqueue(envelope(3));

        let mut seen = Vec::new();
        queue.flush(|env| seen.push(env.payload["match_id"].as_i64().unwrap()));

        assert_eq!(seen, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let mut queue = MessageQueue::new();
        let mut called = false;
        queue.flush(|_| called = true);
        assert!(!called);
    }

    #[test]
    fn test_flush_delivers_each_exactly_once() {
        let mut queue = MessageQueue::new();
        queue.enqueue(envelope(1));

        let mut count = 0;
        queue.flush(|_| count += 1);
        queue.flush(|_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_clear() {
        let mut queue = MessageQueue::new();
        queue.enqueue(envelope(1));
        queue.enqueue(envelope(2));
        assert_eq!(queue.len(), 2);
        queue.clear();
        assert!(queue.is_empty());
    }
}
