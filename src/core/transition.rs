//! Transitions between vertices of the model.

use super::action::Action;
use super::guard::Guard;
use super::key::{EventKey, StateKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a transition treats its source state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    /// Exits the source (even for self transitions) and enters the target
    External,
    /// Runs actions only; no exit or entry
    Internal,
    /// Does not exit the source when the target is one of its substates
    Local,
}

/// What makes a transition eligible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger<E> {
    /// Fires on a submitted event
    Event(E),
    /// Fires on the completion event of the source state
    Completion,
    /// Fires `count` times (forever if `None`) every `period` while the
    /// source state stays active
    Timer {
        period: Duration,
        count: Option<u32>,
    },
}

impl<E: PartialEq> Trigger<E> {
    pub fn matches_event(&self, event: &E) -> bool {
        matches!(self, Trigger::Event(e) if e == event)
    }

    pub fn is_completion(&self) -> bool {
        matches!(self, Trigger::Completion)
    }

    pub fn event(&self) -> Option<&E> {
        match self {
            Trigger::Event(e) => Some(e),
            _ => None,
        }
    }
}

/// An immutable edge of the model.
pub struct Transition<S: StateKey, E: EventKey, Env> {
    pub name: Option<String>,
    pub source: S,
    /// State or pseudostate; `None` for internal transitions
    pub target: Option<S>,
    pub trigger: Trigger<E>,
    pub guard: Option<Guard<S, E, Env>>,
    pub actions: Vec<Action<S, E, Env>>,
    pub kind: TransitionKind,
}

impl<S: StateKey, E: EventKey, Env> Transition<S, E, Env> {
    pub fn is_internal(&self) -> bool {
        self.kind == TransitionKind::Internal || self.target.is_none()
    }

    /// Display label for logs and notifications.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => match &self.target {
                Some(target) => format!("{:?}->{:?}", self.source, target),
                None => format!("{:?} (internal)", self.source),
            },
        }
    }
}

impl<S: StateKey, E: EventKey, Env> Clone for Transition<S, E, Env> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            source: self.source.clone(),
            target: self.target.clone(),
            trigger: self.trigger.clone(),
            guard: self.guard.clone(),
            actions: self.actions.clone(),
            kind: self.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(target: Option<&str>, kind: TransitionKind) -> Transition<String, String, ()> {
        Transition {
            name: None,
            source: "A".to_string(),
            target: target.map(str::to_string),
            trigger: Trigger::Event("go".to_string()),
            guard: None,
            actions: Vec::new(),
            kind,
        }
    }

    #[test]
    fn trigger_matches_only_its_event() {
        let trigger = Trigger::Event("go".to_string());

        assert!(trigger.matches_event(&"go".to_string()));
        assert!(!trigger.matches_event(&"stop".to_string()));
        assert!(!Trigger::<String>::Completion.matches_event(&"go".to_string()));
        assert!(Trigger::<String>::Completion.is_completion());
    }

    #[test]
    fn internal_when_kind_or_missing_target() {
        assert!(transition(None, TransitionKind::External).is_internal());
        assert!(transition(Some("A"), TransitionKind::Internal).is_internal());
        assert!(!transition(Some("B"), TransitionKind::External).is_internal());
    }

    #[test]
    fn label_prefers_name() {
        let mut t = transition(Some("B"), TransitionKind::External);
        assert_eq!(t.label(), "\"A\"->\"B\"");

        t.name = Some("advance".to_string());
        assert_eq!(t.label(), "advance");
    }
}
