//! Key traits identifying states and events.
//!
//! The engine never inspects keys beyond equality and hashing. Any type
//! that is cloneable, comparable, hashable, debuggable and serializable
//! can name states or events; both traits are blanket implemented.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Identity of a state or pseudostate in a machine model.
///
/// # Required Traits
///
/// - `Clone`: keys are copied into contexts, snapshots and notifications
/// - `Eq` + `Hash`: keys index the model and the runtime configuration
/// - `Debug`: keys appear in logs and error messages
/// - `Serialize` + `DeserializeOwned`: keys are persisted in snapshots
///
/// # Example
///
/// ```rust
/// use statecraft::core::StateKey;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
/// enum Phase {
///     Idle,
///     Running,
/// }
///
/// fn takes_key<S: StateKey>(_key: S) {}
/// takes_key(Phase::Idle);
/// takes_key(String::from("Running"));
/// ```
pub trait StateKey:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> StateKey for T where
    T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Identity of an event that may trigger transitions.
///
/// Carries the same capabilities as [`StateKey`]. Events are stored in the
/// deferred queue, so they must be serializable as well.
pub trait EventKey:
    Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> EventKey for T where
    T: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashSet;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
    enum TestState {
        Initial,
        Processing,
    }

    fn assert_state_key<S: StateKey>() {}
    fn assert_event_key<E: EventKey>() {}

    #[test]
    fn enums_and_strings_are_keys() {
        assert_state_key::<TestState>();
        assert_state_key::<String>();
        assert_state_key::<u32>();
        assert_event_key::<TestState>();
        assert_event_key::<String>();
    }

    #[test]
    fn keys_hash_by_identity() {
        let mut set = HashSet::new();
        set.insert(TestState::Initial);
        set.insert(TestState::Initial);
        set.insert(TestState::Processing);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn key_serializes_correctly() {
        let json = serde_json::to_string(&TestState::Processing).unwrap();
        let back: TestState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TestState::Processing);
    }
}
