//! Builder for constructing running state machines.

use crate::builder::error::BuildError;
use crate::checkpoint::{Snapshot, StatePersister};
use crate::config::EngineConfig;
use crate::core::{EventKey, MachineModel, StateKey};
use crate::engine::{StateMachine, StateMachineListener};
use std::sync::Arc;

/// Builder for a [`StateMachine`] over a finished model.
///
/// The model is shared: build it once, wrap it in an `Arc` and hand it to
/// as many machines as needed with [`StateMachineBuilder::shared`].
pub struct StateMachineBuilder<S: StateKey, E: EventKey, Env> {
    model: Arc<MachineModel<S, E, Env>>,
    env: Env,
    config: EngineConfig,
    listeners: Vec<Arc<dyn StateMachineListener<S, E>>>,
    persister: Option<Arc<dyn StatePersister<S, E>>>,
    restore: Option<Snapshot<S, E>>,
}

impl<S, E, Env> StateMachineBuilder<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    pub fn new(model: MachineModel<S, E, Env>, env: Env) -> Self {
        Self::shared(Arc::new(model), env)
    }

    pub fn shared(model: Arc<MachineModel<S, E, Env>>, env: Env) -> Self {
        Self {
            model,
            env,
            config: EngineConfig::default(),
            listeners: Vec::new(),
            persister: None,
            restore: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a listener; listeners are notified in registration order.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: StateMachineListener<S, E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Persist a snapshot after every committed transition.
    pub fn persister<P>(mut self, persister: Arc<P>) -> Self
    where
        P: StatePersister<S, E> + 'static,
    {
        self.persister = Some(persister);
        self
    }

    /// Start from `snapshot` instead of the initial configuration.
    pub fn restore(mut self, snapshot: Snapshot<S, E>) -> Self {
        self.restore = Some(snapshot);
        self
    }

    /// Build the machine. It stays idle until
    /// [`start`](StateMachine::start) is called.
    pub fn build(self) -> Result<StateMachine<S, E, Env>, BuildError> {
        self.config.validate()?;

        if let Some(snapshot) = &self.restore {
            snapshot.validate(&self.model)?;
        }

        Ok(StateMachine::new(
            self.model,
            self.env,
            self.config,
            self.listeners,
            self.persister,
            self.restore,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ModelBuilder, StateBuilder, TransitionBuilder};
    use crate::checkpoint::InMemoryPersister;
    use crate::core::{RegionId, Variables};
    use crate::engine::{MachineStatus, Notification};

    fn model() -> MachineModel<String, String, ()> {
        ModelBuilder::new()
            .state(StateBuilder::new("Idle".to_string()).initial())
            .state(StateBuilder::new("Running".to_string()))
            .transition(
                TransitionBuilder::new()
                    .from("Idle".to_string())
                    .to("Running".to_string())
                    .on("go".to_string()),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn builder_validates_config() {
        let result = StateMachineBuilder::new(model(), ())
            .config(EngineConfig::new().max_run_to_completion_steps(0))
            .build();

        assert!(matches!(result, Err(BuildError::Config(_))));
    }

    #[test]
    fn builder_rejects_foreign_snapshot() {
        let snapshot = Snapshot::new("m", vec![(RegionId::root(), "Elsewhere".to_string())], Variables::new());
        let result = StateMachineBuilder::new(model(), ()).restore(snapshot).build();

        assert!(matches!(result, Err(BuildError::Restore(_))));
    }

    #[test]
    fn fluent_api_builds_idle_machine() {
        let persister = Arc::new(InMemoryPersister::new());
        let machine = StateMachineBuilder::new(model(), ())
            .config(EngineConfig::new().machine_id("door-1"))
            .listener(|_: &Notification<String, String>| {})
            .persister(persister)
            .build()
            .unwrap();

        assert_eq!(machine.machine_id(), "door-1");
        assert_eq!(machine.status(), MachineStatus::Idle);
    }
}
