//! Journal of committed transitions.
//!
//! Every committed state change is recorded as a [`TransitionRecord`]. The
//! journal is bounded; the oldest records are evicted first.

use super::key::{EventKey, StateKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// What caused a committed transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub enum Cause<S: StateKey, E: EventKey> {
    /// Machine start (initial resolution)
    Start,
    Event(E),
    Completion(S),
    Timer,
}

/// Record of a single committed state change.
///
/// # Example
///
/// ```rust
/// use statecraft::core::{Cause, TransitionRecord};
/// use chrono::Utc;
///
/// let record: TransitionRecord<String, String> = TransitionRecord {
///     from: vec!["Idle".to_string()],
///     to: vec!["Running".to_string()],
///     cause: Cause::Event("go".to_string()),
///     transition: Some("start".to_string()),
///     timestamp: Utc::now(),
/// };
/// assert_eq!(record.to, vec!["Running".to_string()]);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TransitionRecord<S: StateKey, E: EventKey> {
    /// Active states before the change, outermost first
    pub from: Vec<S>,
    /// Active states after the change, outermost first
    pub to: Vec<S>,
    pub cause: Cause<S, E>,
    pub transition: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Ordered, bounded history of committed transitions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TransitionJournal<S: StateKey, E: EventKey> {
    records: VecDeque<TransitionRecord<S, E>>,
    capacity: usize,
}

impl<S: StateKey, E: EventKey> Default for TransitionJournal<S, E> {
    fn default() -> Self {
        Self::new(256)
    }
}

impl<S: StateKey, E: EventKey> TransitionJournal<S, E> {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the oldest one when full.
    pub fn record(&mut self, record: TransitionRecord<S, E>) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Configurations traversed: the first record's `from`, then every `to`.
    pub fn path(&self) -> Vec<&[S]> {
        let mut path = Vec::new();
        if let Some(first) = self.records.front() {
            path.push(first.from.as_slice());
        }
        for record in &self.records {
            path.push(record.to.as_slice());
        }
        path
    }

    /// Duration between the first and last retained records.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.front()?, self.records.back()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    pub fn records(&self) -> impl Iterator<Item = &TransitionRecord<S, E>> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TransitionRecord<S, E>> {
        self.records.back()
    }
}
