//! The event-processing engine.
//!
//! The engine consumes a finished [`MachineModel`](crate::core::MachineModel)
//! and runs it: the [`StateMachine`] handle queues events, a driver task
//! processes them one at a time, the resolver walks pseudostate chains, and
//! the region coordinator keeps the per-region active states and history
//! memory current.

mod configuration;
mod deferred;
mod error;
mod machine;
mod notify;
mod processor;
mod regions;
mod resolver;
mod timer;

pub use configuration::{Configuration, RegionMemory};
pub use deferred::{DeferredEvent, DeferredQueue};
pub use error::{EngineError, MachineError};
pub use machine::{MachineStatus, Receipt, StateMachine};
pub use notify::{Notification, StateMachineListener};
pub use processor::{EventOutcome, EventStatus, PendingJoin};
pub use regions::{completions, enter_state, exit_region, is_complete, Completion};
