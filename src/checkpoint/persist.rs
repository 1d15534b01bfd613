//! Persistence seam for committed snapshots.

use super::{CheckpointError, Snapshot};
use crate::core::{EventKey, StateKey};
use std::sync::Mutex;

/// Receives a snapshot after every committed transition.
///
/// Persistence is synchronous and runs inside the processing step. A
/// failure is reported as an engine error; the transition stays committed.
pub trait StatePersister<S: StateKey, E: EventKey>: Send + Sync {
    fn persist(&self, snapshot: &Snapshot<S, E>) -> Result<(), CheckpointError>;
}

/// Keeps every persisted snapshot in memory.
pub struct InMemoryPersister<S: StateKey, E: EventKey> {
    snapshots: Mutex<Vec<Snapshot<S, E>>>,
}

impl<S: StateKey, E: EventKey> InMemoryPersister<S, E> {
    pub fn new() -> Self {
        Self {
            snapshots: Mutex::new(Vec::new()),
        }
    }

    /// Most recently persisted snapshot.
    pub fn latest(&self) -> Option<Snapshot<S, E>> {
        self.snapshots.lock().ok()?.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: StateKey, E: EventKey> Default for InMemoryPersister<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateKey, E: EventKey> StatePersister<S, E> for InMemoryPersister<S, E> {
    fn persist(&self, snapshot: &Snapshot<S, E>) -> Result<(), CheckpointError> {
        self.snapshots
            .lock()
            .map_err(|e| CheckpointError::PersistFailed(e.to_string()))?
            .push(snapshot.clone());
        Ok(())
    }
}
