//! The running state machine handle.
//!
//! A [`StateMachine`] owns a processor behind a per-machine processing lock
//! and a driver task that drains the submission queue one command at a
//! time. Submitting only enqueues; the driver is the only code that mutates
//! the runtime configuration.

use super::error::{EngineError, MachineError};
use super::notify::Notifier;
use super::processor::{EventOutcome, PendingJoin, Processor, Signal};
use super::DeferredEvent;
use crate::checkpoint::{Snapshot, StatePersister};
use crate::config::EngineConfig;
use crate::core::{EventKey, MachineModel, StateKey, TransitionJournal};
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use super::notify::StateMachineListener;

/// Work items for the driver task.
pub(crate) enum Command<S: StateKey, E: EventKey> {
    Event {
        event: E,
        payload: Option<Value>,
        reply: oneshot::Sender<EventOutcome<S>>,
    },
    Tick {
        transition: usize,
        epoch: u64,
    },
    Stop,
}

/// Lifecycle of a machine. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineStatus {
    Idle,
    Processing,
    Stopped,
}

impl MachineStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Processing,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Processing => 1,
            Self::Stopped => 2,
        }
    }
}

/// Acknowledgement of a queued event.
#[derive(Debug)]
pub struct Receipt<S: StateKey> {
    reply: oneshot::Receiver<EventOutcome<S>>,
}

impl<S: StateKey> Receipt<S> {
    /// Wait until the event has been processed.
    ///
    /// Events still queued when the machine stops resolve to
    /// [`EventStatus::Rejected`](super::EventStatus::Rejected).
    pub async fn outcome(self) -> EventOutcome<S> {
        self.reply.await.unwrap_or_else(|_| EventOutcome::rejected())
    }
}

struct Shared<S: StateKey, E: EventKey, Env> {
    machine_id: String,
    status: AtomicU8,
    sender: mpsc::UnboundedSender<Command<S, E>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Command<S, E>>>>,
    processor: Mutex<Processor<S, E, Env>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    restore: Mutex<Option<Snapshot<S, E>>>,
    leaks: Mutex<Vec<EngineError<S>>>,
}

impl<S: StateKey, E: EventKey, Env> Shared<S, E, Env> {
    fn status(&self) -> MachineStatus {
        MachineStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: MachineStatus) -> MachineStatus {
        MachineStatus::from_u8(self.status.swap(status.as_u8(), Ordering::SeqCst))
    }
}

/// Handle to a running hierarchical state machine.
///
/// Handles are cheap to clone; every clone drives the same machine.
///
/// # Example
///
/// ```rust
/// use statecraft::builder::{ModelBuilder, StateBuilder, StateMachineBuilder, TransitionBuilder};
/// use statecraft::key_enum;
///
/// key_enum! {
///     enum Phase { Idle, Running }
/// }
/// key_enum! {
///     enum Signal { Go }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let model = ModelBuilder::<Phase, Signal, ()>::new()
///     .state(StateBuilder::new(Phase::Idle).initial())
///     .state(StateBuilder::new(Phase::Running))
///     .transition(TransitionBuilder::new().from(Phase::Idle).to(Phase::Running).on(Signal::Go))
///     .build()
///     .unwrap();
///
/// let machine = StateMachineBuilder::new(model, ()).build().unwrap();
/// machine.start().await.unwrap();
/// machine.send(Signal::Go).await.unwrap();
///
/// assert_eq!(machine.active_states().await, vec![Phase::Running]);
/// machine.stop().await;
/// # }
/// ```
pub struct StateMachine<S: StateKey, E: EventKey, Env> {
    shared: Arc<Shared<S, E, Env>>,
}

impl<S: StateKey, E: EventKey, Env> Clone for StateMachine<S, E, Env> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, E, Env> StateMachine<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        model: Arc<MachineModel<S, E, Env>>,
        env: Env,
        config: EngineConfig,
        listeners: Vec<Arc<dyn StateMachineListener<S, E>>>,
        persister: Option<Arc<dyn StatePersister<S, E>>>,
        restore: Option<Snapshot<S, E>>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let machine_id = config.machine_id.clone();
        let processor = Processor::new(model, env, config, Notifier::new(listeners), persister);

        Self {
            shared: Arc::new(Shared {
                machine_id,
                status: AtomicU8::new(MachineStatus::Idle.as_u8()),
                sender,
                receiver: Mutex::new(Some(receiver)),
                processor: Mutex::new(processor),
                driver: Mutex::new(None),
                restore: Mutex::new(restore),
                leaks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.shared.machine_id
    }

    pub fn status(&self) -> MachineStatus {
        self.shared.status()
    }

    /// Enter the initial configuration, or the restore snapshot when one was
    /// supplied, and start the driver.
    ///
    /// Returns non-fatal errors raised while entering, such as failed entry
    /// actions.
    pub async fn start(&self) -> Result<Vec<EngineError<S>>, MachineError<S>> {
        let mut processor = self.shared.processor.lock().await;
        match self.shared.status() {
            MachineStatus::Idle => {}
            MachineStatus::Processing => return Err(MachineError::AlreadyStarted),
            MachineStatus::Stopped => return Err(MachineError::Disabled),
        }

        processor.attach_timers(self.shared.sender.clone());
        let restore = self.shared.restore.lock().await.take();
        let errors = match restore {
            Some(snapshot) => {
                processor.restore(snapshot)?;
                Vec::new()
            }
            None => processor.start().await.map_err(MachineError::Start)?,
        };
        drop(processor);

        let receiver = self
            .shared
            .receiver
            .lock()
            .await
            .take()
            .ok_or(MachineError::AlreadyStarted)?;
        self.shared.set_status(MachineStatus::Processing);

        let handle = tokio::spawn(drive(Arc::clone(&self.shared), receiver));
        *self.shared.driver.lock().await = Some(handle);
        Ok(errors)
    }

    /// Stop the machine.
    ///
    /// An event being processed completes first; events still queued are
    /// rejected. Returns join leaks found at shutdown. Stopping twice is a
    /// no-op.
    pub async fn stop(&self) -> Vec<EngineError<S>> {
        let previous = self.shared.set_status(MachineStatus::Stopped);

        if previous != MachineStatus::Stopped {
            let _ = self.shared.sender.send(Command::Stop);
        }

        let handle = self.shared.driver.lock().await.take();
        match handle {
            Some(handle) => {
                if let Err(error) = handle.await {
                    tracing::error!(%error, "driver task failed");
                }
            }
            None if previous == MachineStatus::Idle => {
                let leaks = self.shared.processor.lock().await.shutdown();
                *self.shared.leaks.lock().await = leaks;
            }
            None => {}
        }

        std::mem::take(&mut *self.shared.leaks.lock().await)
    }

    pub fn submit(&self, event: E) -> Result<Receipt<S>, MachineError<S>> {
        self.enqueue(event, None)
    }

    pub fn submit_with(&self, event: E, payload: Value) -> Result<Receipt<S>, MachineError<S>> {
        self.enqueue(event, Some(payload))
    }

    /// Submit and wait for the outcome.
    pub async fn send(&self, event: E) -> Result<EventOutcome<S>, MachineError<S>> {
        Ok(self.submit(event)?.outcome().await)
    }

    pub async fn send_with(&self, event: E, payload: Value) -> Result<EventOutcome<S>, MachineError<S>> {
        Ok(self.submit_with(event, payload)?.outcome().await)
    }

    fn enqueue(&self, event: E, payload: Option<Value>) -> Result<Receipt<S>, MachineError<S>> {
        if self.shared.status() == MachineStatus::Stopped {
            return Err(MachineError::Disabled);
        }

        let (reply, receipt) = oneshot::channel();
        self.shared
            .sender
            .send(Command::Event {
                event,
                payload,
                reply,
            })
            .map_err(|_| MachineError::Disabled)?;
        Ok(Receipt { reply: receipt })
    }

    pub async fn active_states(&self) -> Vec<S> {
        self.shared.processor.lock().await.active_states()
    }

    pub async fn is_active(&self, state: &S) -> bool {
        self.shared.processor.lock().await.is_active(state)
    }

    pub async fn variable(&self, key: &str) -> Option<Value> {
        self.shared.processor.lock().await.variable(key)
    }

    pub async fn deferred_events(&self) -> Vec<DeferredEvent<E>> {
        self.shared.processor.lock().await.deferred_events()
    }

    pub async fn journal(&self) -> TransitionJournal<S, E> {
        self.shared.processor.lock().await.journal()
    }

    pub async fn snapshot(&self) -> Snapshot<S, E> {
        self.shared.processor.lock().await.snapshot()
    }

    pub async fn pending_joins(&self) -> Vec<PendingJoin<S>> {
        self.shared.processor.lock().await.pending_joins()
    }
}

/// Driver loop: one command at a time under the processing lock.
async fn drive<S, E, Env>(shared: Arc<Shared<S, E, Env>>, mut receiver: mpsc::UnboundedReceiver<Command<S, E>>)
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    let mut finished = shared.processor.lock().await.is_finished();

    while !finished {
        let Some(command) = receiver.recv().await else {
            break;
        };

        match command {
            Command::Stop => break,
            Command::Event { reply, .. } if shared.status() == MachineStatus::Stopped => {
                let _ = reply.send(EventOutcome::rejected());
            }
            Command::Event {
                event,
                payload,
                reply,
            } => {
                let mut processor = shared.processor.lock().await;
                let outcome = processor.dispatch(Signal::Event { event, payload }).await;
                finished = processor.is_finished();
                if reply.send(outcome).is_err() {
                    tracing::debug!("event submitter went away before the outcome");
                }
            }
            Command::Tick { .. } if shared.status() == MachineStatus::Stopped => {}
            Command::Tick { transition, epoch } => {
                let mut processor = shared.processor.lock().await;
                processor.dispatch(Signal::Timer { transition, epoch }).await;
                finished = processor.is_finished();
            }
        }
    }

    shared.set_status(MachineStatus::Stopped);
    receiver.close();
    while let Ok(command) = receiver.try_recv() {
        if let Command::Event { reply, .. } = command {
            let _ = reply.send(EventOutcome::rejected());
        }
    }

    let leaks = shared.processor.lock().await.shutdown();
    *shared.leaks.lock().await = leaks;
}
