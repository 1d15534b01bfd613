//! Builder for constructing transitions.

use crate::builder::error::BuildError;
use crate::core::{Action, EventKey, Guard, StateContext, StateKey, Transition, TransitionKind, Trigger};
use std::time::Duration;

/// Builder for constructing transitions with a fluent API.
///
/// A transition without `.on(event)` or a timer is a completion
/// transition: it fires when its source state completes.
pub struct TransitionBuilder<S: StateKey, E: EventKey, Env> {
    name: Option<String>,
    from: Option<S>,
    to: Option<S>,
    trigger: Trigger<E>,
    guard: Option<Guard<S, E, Env>>,
    actions: Vec<Action<S, E, Env>>,
    kind: TransitionKind,
}

impl<S, E, Env> TransitionBuilder<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    /// Create a new transition builder.
    pub fn new() -> Self {
        Self {
            name: None,
            from: None,
            to: None,
            trigger: Trigger::Completion,
            guard: None,
            actions: Vec::new(),
            kind: TransitionKind::External,
        }
    }

    /// Set the source state (required).
    pub fn from(mut self, state: S) -> Self {
        self.from = Some(state);
        self
    }

    /// Set the target state or pseudostate (required unless internal).
    pub fn to(mut self, vertex: S) -> Self {
        self.to = Some(vertex);
        self
    }

    /// Trigger on an event.
    pub fn on(mut self, event: E) -> Self {
        self.trigger = Trigger::Event(event);
        self
    }

    /// Fire every `period` while the source stays active.
    pub fn timer(mut self, period: Duration) -> Self {
        self.trigger = Trigger::Timer {
            period,
            count: None,
        };
        self
    }

    /// Fire once, `period` after the source was entered.
    pub fn timer_once(self, period: Duration) -> Self {
        self.timer_count(period, 1)
    }

    /// Fire at most `count` times, `period` apart.
    pub fn timer_count(mut self, period: Duration, count: u32) -> Self {
        self.trigger = Trigger::Timer {
            period,
            count: Some(count),
        };
        self
    }

    /// Add a guard (optional).
    pub fn guard(mut self, guard: Guard<S, E, Env>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Add a guard using a closure (optional).
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StateContext<S, E>) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Guard::new(predicate));
        self
    }

    /// Append an action; actions run in the order added.
    pub fn action(mut self, action: Action<S, E, Env>) -> Self {
        self.actions.push(action);
        self
    }

    /// Run actions without leaving the source.
    pub fn internal(mut self) -> Self {
        self.kind = TransitionKind::Internal;
        self
    }

    /// Do not exit the source when the target is one of its substates.
    pub fn local(mut self) -> Self {
        self.kind = TransitionKind::Local;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Build the transition.
    pub fn build(self) -> Result<Transition<S, E, Env>, BuildError> {
        let source = self.from.ok_or(BuildError::MissingFromState)?;
        let target = match self.kind {
            TransitionKind::Internal => None,
            _ => Some(self.to.ok_or(BuildError::MissingToState)?),
        };

        let transition = Transition {
            name: self.name,
            source,
            target,
            trigger: self.trigger,
            guard: self.guard,
            actions: self.actions,
            kind: self.kind,
        };

        if let Trigger::Timer { period, count } = &transition.trigger {
            if period.is_zero() || *count == Some(0) {
                return Err(BuildError::InvalidTimer(transition.label()));
            }
        }

        Ok(transition)
    }
}

impl<S, E, Env> Default for TransitionBuilder<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
