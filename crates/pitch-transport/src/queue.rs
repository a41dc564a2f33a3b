//! Per-token bounded message queues.
//!
//! The token set is fixed at construction. Each token owns one FIFO guarded
//! by its own mutex, which is the single synchronization point for that
//! token's traffic. Operations never block beyond the lock and never await.
//!
//! When a queue is full, the oldest message is evicted before the new one is
//! enqueued. Only the latest state matters for telemetry, so most-recent
//! wins.

use crate::auth::AuthError;
use crate::metrics;
use common::types::ClientToken;
use pitch_protocol::Message;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default per-token queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Bounded drop-oldest queues keyed by client token.
#[derive(Debug)]
pub struct MessageQueues {
    capacity: usize,
    queues: HashMap<ClientToken, Mutex<VecDeque<Message>>>,
}

impl MessageQueues {
    /// Create one empty queue per token. A zero capacity is raised to 1.
    pub fn new<I>(tokens: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = ClientToken>,
    {
        let capacity = capacity.max(1);
        let queues = tokens
            .into_iter()
            .map(|token| (token, Mutex::new(VecDeque::with_capacity(capacity))))
            .collect();
        Self { capacity, queues }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `token` is registered.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.queues.contains_key(token)
    }

    /// The registered token equal to `token`, if any.
    #[must_use]
    pub fn registered(&self, token: &str) -> Option<&ClientToken> {
        self.queues.get_key_value(token).map(|(key, _)| key)
    }

    /// Every registered token, in no particular order.
    pub fn tokens(&self) -> impl Iterator<Item = &ClientToken> {
        self.queues.keys()
    }

    /// Number of messages pending for `token`.
    #[must_use]
    pub fn pending(&self, token: &str) -> Option<usize> {
        self.queues.get(token).map(|queue| lock(queue).len())
    }

    /// Enqueue a message for `token`, returning the message evicted to make
    /// room, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownToken`] if the token is not registered.
    pub fn push(&self, token: &str, message: Message) -> Result<Option<Message>, AuthError> {
        let queue = self.queues.get(token).ok_or(AuthError::UnknownToken)?;
        Ok(self.push_into(queue, message))
    }

    /// Dequeue the oldest message for `token`. `Ok(None)` means the queue is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownToken`] if the token is not registered.
    pub fn pop(&self, token: &str) -> Result<Option<Message>, AuthError> {
        let queue = self.queues.get(token).ok_or(AuthError::UnknownToken)?;
        Ok(lock(queue).pop_front())
    }

    /// Enqueue a copy of `message` for every registered token.
    pub fn broadcast(&self, message: &Message) {
        for queue in self.queues.values() {
            self.push_into(queue, message.clone());
        }
    }

    fn push_into(&self, queue: &Mutex<VecDeque<Message>>, message: Message) -> Option<Message> {
        let mut queue = lock(queue);
        let evicted = if queue.len() >= self.capacity {
            metrics::record_evicted();
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(message);
        metrics::record_enqueued();
        evicted
    }
}

// A poisoned queue still holds valid messages; keep serving it.
fn lock(queue: &Mutex<VecDeque<Message>>) -> MutexGuard<'_, VecDeque<Message>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pitch_protocol::MessageKind;

    fn numbered(n: i32) -> Message {
        Message::to_client(MessageKind::PushRobotStatus).with_field("seq", n)
    }

    fn seq(message: &Message) -> i32 {
        message.document().get_i32("seq").unwrap()
    }

    fn queues(capacity: usize) -> MessageQueues {
        MessageQueues::new([ClientToken::new("red"), ClientToken::new("blue")], capacity)
    }

    #[test]
    fn test_fifo_order() {
        let queues = queues(10);
        for n in 0..3 {
            queues.push("red", numbered(n)).unwrap();
        }

        let drained: Vec<i32> = std::iter::from_fn(|| queues.pop("red").unwrap())
            .map(|m| seq(&m))
            .collect();

        assert_eq!(drained, vec![0, 1, 2]);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let queues = queues(10);
        let mut evicted = Vec::new();
        for n in 1..=11 {
            if let Some(old) = queues.push("red", numbered(n)).unwrap() {
                evicted.push(seq(&old));
            }
        }

        assert_eq!(evicted, vec![1]);
        assert_eq!(queues.pending("red"), Some(10));

        let drained: Vec<i32> = std::iter::from_fn(|| queues.pop("red").unwrap())
            .map(|m| seq(&m))
            .collect();
        assert_eq!(drained, (2..=11).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_empty_is_none() {
        assert!(queues(10).pop("blue").unwrap().is_none());
    }

    #[test]
    fn test_unknown_token() {
        let queues = queues(10);
        assert_eq!(queues.push("green", numbered(0)), Err(AuthError::UnknownToken));
        assert_eq!(queues.pop("green"), Err(AuthError::UnknownToken));
        assert_eq!(queues.pending("green"), None);
    }

    #[test]
    fn test_queues_are_independent() {
        let queues = queues(10);
        queues.push("red", numbered(7)).unwrap();

        assert!(queues.pop("blue").unwrap().is_none());
        assert_eq!(seq(&queues.pop("red").unwrap().unwrap()), 7);
    }

    #[test]
    fn test_broadcast_reaches_every_token() {
        let queues = queues(10);
        queues.broadcast(&numbered(3));

        assert_eq!(seq(&queues.pop("red").unwrap().unwrap()), 3);
        assert_eq!(seq(&queues.pop("blue").unwrap().unwrap()), 3);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let queues = queues(0);
        assert_eq!(queues.capacity(), 1);

        queues.push("red", numbered(1)).unwrap();
        queues.push("red", numbered(2)).unwrap();

        assert_eq!(seq(&queues.pop("red").unwrap().unwrap()), 2);
    }

    #[test]
    fn test_registered_lookup() {
        let queues = queues(10);
        assert!(queues.contains("red"));
        assert_eq!(queues.registered("blue").map(ClientToken::as_str), Some("blue"));
        assert!(queues.registered("green").is_none());
        assert_eq!(queues.tokens().count(), 2);
    }
}
