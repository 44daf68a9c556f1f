use std::collections::VecDeque;

use bridge_types::models::{Channel, ChatMessage};

/// Most entries the delivery queue holds at once.
pub const QUEUE_CAP: usize = 50;

/// A line waiting for its turn on the chat network.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub message: ChatMessage,
    pub channel: Channel,
}

/// Bounded FIFO drained one entry per tick.
#[derive(Debug)]
pub struct DeliveryQueue {
    entries: VecDeque<QueuedMessage>,
    cap: usize,
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::with_capacity(QUEUE_CAP)
    }
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Append unless the queue is at capacity.
    pub fn enqueue(&mut self, entry: QueuedMessage) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push_back(entry);
        true
    }

    pub fn pop(&mut self) -> Option<QueuedMessage> {
        self.entries.pop_front()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.cap
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

    fn entry(id: i64) -> QueuedMessage {
        QueuedMessage {
            message: ChatMessage::new(id, "bob", "line", "g1", "r1"),
            channel: Channel {
                id: 1,
                server_id: 1,
                name: "r1".into(),
                description: String::new(),
                group: "g1".into(),
                room: "r1".into(),
                network: "quakenet".into(),
                network_room: "#r1".into(),
                is_private: false,
            },
        }
    }

    #[test]
    fn rejects_the_fifty_first_entry() {
        let mut queue = DeliveryQueue::new();
        for id in 1..=50 {
            assert!(queue.enqueue(entry(id)));
        }
        assert!(queue.is_full());
        assert!(!queue.enqueue(entry(51)));
        assert_eq!(queue.len(), QUEUE_CAP);
    }

    #[test]
    fn pops_in_arrival_order() {
        let mut queue = DeliveryQueue::new();
        queue.enqueue(entry(7));
        queue.enqueue(entry(8));
        assert_eq!(queue.pop().map(|e| e.message.id), Some(7));
        assert_eq!(queue.pop().map(|e| e.message.id), Some(8));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }
}
