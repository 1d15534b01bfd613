//! Deferred event queue.

use crate::core::EventKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// An event held back until the configuration changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct DeferredEvent<E: EventKey> {
    pub event: E,
    pub payload: Option<Value>,
}

/// FIFO of deferred events, one per machine.
#[derive(Clone, Debug)]
pub struct DeferredQueue<E: EventKey> {
    events: VecDeque<DeferredEvent<E>>,
    capacity: Option<usize>,
}

impl<E: EventKey> DeferredQueue<E> {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            events: VecDeque::new(),
            capacity,
        }
    }

    /// Append an event. Returns false when the queue is at capacity.
    pub fn push(&mut self, event: DeferredEvent<E>) -> bool {
        if self.capacity.is_some_and(|cap| self.events.len() >= cap) {
            return false;
        }
        self.events.push_back(event);
        true
    }

    /// Remove and return every queued event in arrival order.
    pub fn take_all(&mut self) -> Vec<DeferredEvent<E>> {
        self.events.drain(..).collect()
    }

    /// Put replayed events back at the end, keeping their order.
    /// Capacity is not enforced; these events were already accepted.
    pub fn requeue(&mut self, events: impl IntoIterator<Item = DeferredEvent<E>>) {
        self.events.extend(events);
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeferredEvent<E>> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<E: EventKey> Default for DeferredQueue<E> {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(name: &str) -> DeferredEvent<String> {
        DeferredEvent {
            event: name.to_string(),
            payload: None,
        }
    }

    #[test]
    fn take_all_preserves_arrival_order() {
        let mut queue = DeferredQueue::default();
        queue.push(ev("e2"));
        queue.push(ev("e3"));
        queue.push(ev("e1"));

        let events: Vec<_> = queue.take_all().into_iter().map(|d| d.event).collect();

        assert_eq!(events, vec!["e2", "e3", "e1"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn requeue_ignores_capacity_and_keeps_order() {
        let mut queue = DeferredQueue::new(Some(1));
        queue.push(ev("first"));
        queue.requeue(vec![ev("second"), ev("third")]);

        let events: Vec<_> = queue.iter().map(|d| d.event.as_str()).collect();
        assert_eq!(events, vec!["first", "second", "third"]);
    }

    #[test]
    fn capacity_rejects_overflow() {
        let mut queue = DeferredQueue::new(Some(1));

        assert!(queue.push(ev("a")));
        assert!(!queue.push(ev("b")));
        assert_eq!(queue.len(), 1);
    }
}
