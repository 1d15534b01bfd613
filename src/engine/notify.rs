//! Notifications published while events are processed.

use super::error::EngineError;
use crate::core::{EventKey, StateKey};
use std::sync::Arc;

/// Something observable happened inside a processing step.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification<S: StateKey, E: EventKey> {
    MachineStarted {
        machine: String,
    },
    MachineStopped {
        machine: String,
    },
    StateEntered(S),
    StateExited(S),
    /// Active configuration before and after a committed transition
    StateChanged {
        from: Vec<S>,
        to: Vec<S>,
    },
    TransitionStarted {
        transition: String,
        source: S,
        target: Option<S>,
    },
    TransitionEnded {
        transition: String,
        source: S,
        target: Option<S>,
    },
    EventDeferred(E),
    EventNotAccepted(E),
    JoinParked {
        join: S,
        arrived: Vec<S>,
    },
    Error(EngineError<S>),
}

/// Receives notifications synchronously, in the order they happen.
///
/// Listeners run inside the processing step and must not block.
pub trait StateMachineListener<S: StateKey, E: EventKey>: Send + Sync {
    fn notify(&self, notification: &Notification<S, E>);
}

impl<S, E, F> StateMachineListener<S, E> for F
where
    S: StateKey,
    E: EventKey,
    F: Fn(&Notification<S, E>) + Send + Sync,
{
    fn notify(&self, notification: &Notification<S, E>) {
        self(notification)
    }
}

/// Fans notifications out to listeners and to the log.
#[derive(Clone)]
pub(crate) struct Notifier<S: StateKey, E: EventKey> {
    listeners: Vec<Arc<dyn StateMachineListener<S, E>>>,
}

impl<S: StateKey, E: EventKey> Notifier<S, E> {
    pub fn new(listeners: Vec<Arc<dyn StateMachineListener<S, E>>>) -> Self {
        Self { listeners }
    }

    pub fn emit(&self, notification: Notification<S, E>) {
        log(&notification);
        for listener in &self.listeners {
            listener.notify(&notification);
        }
    }
}

fn log<S: StateKey, E: EventKey>(notification: &Notification<S, E>) {
    match notification {
        Notification::MachineStarted { machine } => tracing::info!(machine = %machine, "machine started"),
        Notification::MachineStopped { machine } => tracing::info!(machine = %machine, "machine stopped"),
        Notification::StateEntered(state) => tracing::debug!(state = ?state, "state entered"),
        Notification::StateExited(state) => tracing::debug!(state = ?state, "state exited"),
        Notification::StateChanged { from, to } => {
            tracing::info!(from = ?from, to = ?to, "state changed")
        }
        Notification::TransitionStarted { transition, .. } => {
            tracing::debug!(transition = %transition, "transition started")
        }
        Notification::TransitionEnded { transition, .. } => {
            tracing::debug!(transition = %transition, "transition ended")
        }
        Notification::EventDeferred(event) => tracing::debug!(event = ?event, "event deferred"),
        Notification::EventNotAccepted(event) => {
            tracing::warn!(event = ?event, "event not accepted")
        }
        Notification::JoinParked { join, arrived } => {
            tracing::debug!(join = ?join, arrived = ?arrived, "join parked")
        }
        Notification::Error(error) if error.is_resolution_failure() => {
            tracing::error!(%error, "transition aborted")
        }
        Notification::Error(error) => tracing::warn!(%error, "processing error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn closures_are_listeners() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Arc<dyn StateMachineListener<String, String>> =
            Arc::new(move |n: &Notification<String, String>| {
                sink.lock().unwrap().push(n.clone());
            });

        let notifier = Notifier::new(vec![listener]);
        notifier.emit(Notification::StateEntered("A".to_string()));
        notifier.emit(Notification::EventNotAccepted("go".to_string()));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Notification::StateEntered("A".to_string()));
    }

    #[test]
    fn every_listener_is_notified() {
        let count = Arc::new(Mutex::new(0));
        let first = Arc::clone(&count);
        let second = Arc::clone(&count);

        let a: Arc<dyn StateMachineListener<String, String>> =
            Arc::new(move |_: &Notification<String, String>| *first.lock().unwrap() += 1);
        let b: Arc<dyn StateMachineListener<String, String>> =
            Arc::new(move |_: &Notification<String, String>| *second.lock().unwrap() += 1);
        let notifier = Notifier::new(vec![a, b]);
        notifier.emit(Notification::MachineStarted {
            machine: "m".to_string(),
        });

        assert_eq!(*count.lock().unwrap(), 2);
    }
}
