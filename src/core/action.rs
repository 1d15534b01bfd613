//! Side-effecting actions run on entry, exit and transition.
//!
//! An action is a factory that, given the read-only [`StateContext`],
//! produces an effect over the machine environment. The effect yields the
//! extended-state updates it wants committed with the transition; most
//! actions yield an empty map.

use super::context::{StateContext, Variables};
use super::key::{EventKey, StateKey};
use serde_json::Value;
use std::sync::Arc;
use stillwater::effect::BoxedEffect;
use stillwater::prelude::*;
use thiserror::Error;

/// Error raised by a single action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Factory producing the effect that runs an action for one context.
pub type ActionFn<S, E, Env> =
    Arc<dyn Fn(&StateContext<S, E>) -> BoxedEffect<Variables, ActionError, Env> + Send + Sync>;

/// A named or anonymous side effect attached to the model.
///
/// # Example
///
/// ```rust
/// use statecraft::core::Action;
/// use serde_json::json;
///
/// let mark: Action<String, String, ()> = Action::set("visited", json!(true)).named("mark");
/// assert_eq!(mark.name(), Some("mark"));
/// ```
pub struct Action<S: StateKey, E: EventKey, Env> {
    name: Option<String>,
    run: ActionFn<S, E, Env>,
}

impl<S: StateKey, E: EventKey, Env: Clone + Send + Sync + 'static> Action<S, E, Env> {
    /// Create an action from an effect factory.
    pub fn effect<F>(factory: F) -> Self
    where
        F: Fn(&StateContext<S, E>) -> BoxedEffect<Variables, ActionError, Env>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: None,
            run: Arc::new(factory),
        }
    }

    /// Create an action from a synchronous closure with no state updates.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&StateContext<S, E>) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        Self::update(move |ctx| f(ctx).map(|_| Variables::new()))
    }

    /// Create an action from a synchronous closure returning variable updates.
    pub fn update<F>(f: F) -> Self
    where
        F: Fn(&StateContext<S, E>) -> Result<Variables, ActionError> + Send + Sync + 'static,
    {
        Self::effect(
            move |ctx: &StateContext<S, E>| -> BoxedEffect<Variables, ActionError, Env> {
                match f(ctx) {
                    Ok(updates) => pure(updates).boxed(),
                    Err(error) => fail(error).boxed(),
                }
            },
        )
    }

    /// Action that assigns a single extended-state variable.
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        Self::update(move |_| {
            let mut updates = Variables::new();
            updates.insert(key.clone(), value.clone());
            Ok(updates)
        })
    }

    /// Attach a name used in failure reports.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn invoke(&self, ctx: &StateContext<S, E>) -> BoxedEffect<Variables, ActionError, Env> {
        (self.run)(ctx)
    }
}

impl<S: StateKey, E: EventKey, Env> Clone for Action<S, E, Env> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            run: Arc::clone(&self.run),
        }
    }
}

impl<S: StateKey, E: EventKey, Env> std::fmt::Debug for Action<S, E, Env> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action").field("name", &self.name).finish()
    }
}
