//! Guard predicates for controlling state transitions.
//!
//! Guards decide whether a transition, or a choice/junction branch, may be
//! taken. They see a read-only [`StateContext`] and may be pure predicates or
//! effects that suspend on the machine's environment.

use super::context::StateContext;
use super::key::{EventKey, StateKey};
use std::sync::Arc;
use stillwater::effect::BoxedEffect;
use stillwater::prelude::*;
use thiserror::Error;

/// Error raised while evaluating a guard.
///
/// The engine treats a failing guard as `false` and reports the error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GuardError {
    pub message: String,
}

impl GuardError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Factory producing the effect that evaluates a guard for one context.
pub type GuardFn<S, E, Env> =
    Arc<dyn Fn(&StateContext<S, E>) -> BoxedEffect<bool, GuardError, Env> + Send + Sync>;

/// Predicate that determines if a transition or branch can be taken.
///
/// # Example
///
/// ```rust
/// use statecraft::core::Guard;
///
/// // Pure guard over the extended state
/// let armed: Guard<String, String, ()> = Guard::new(|ctx| {
///     ctx.variable("armed").and_then(|v| v.as_bool()).unwrap_or(false)
/// });
/// # let _ = armed;
/// ```
pub struct Guard<S: StateKey, E: EventKey, Env> {
    predicate: GuardFn<S, E, Env>,
}

impl<S: StateKey, E: EventKey, Env: Clone + Send + Sync + 'static> Guard<S, E, Env> {
    /// Create a guard from a pure predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&StateContext<S, E>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(
                move |ctx: &StateContext<S, E>| -> BoxedEffect<bool, GuardError, Env> {
                    pure(predicate(ctx)).boxed()
                },
            ),
        }
    }

    /// Create a guard from a predicate that may fail.
    pub fn try_new<F>(predicate: F) -> Self
    where
        F: Fn(&StateContext<S, E>) -> Result<bool, GuardError> + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(
                move |ctx: &StateContext<S, E>| -> BoxedEffect<bool, GuardError, Env> {
                    match predicate(ctx) {
                        Ok(allowed) => pure(allowed).boxed(),
                        Err(error) => fail(error).boxed(),
                    }
                },
            ),
        }
    }

    /// Create a guard whose evaluation is an effect over the environment.
    pub fn effect<F>(factory: F) -> Self
    where
        F: Fn(&StateContext<S, E>) -> BoxedEffect<bool, GuardError, Env> + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(factory),
        }
    }

    /// Guard that accepts every context.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    /// Produce a fresh evaluation effect for this context.
    pub(crate) fn evaluate(&self, ctx: &StateContext<S, E>) -> BoxedEffect<bool, GuardError, Env> {
        (self.predicate)(ctx)
    }
}

impl<S: StateKey, E: EventKey, Env> Clone for Guard<S, E, Env> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<S: StateKey, E: EventKey, Env> std::fmt::Debug for Guard<S, E, Env> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Guard")
    }
}
