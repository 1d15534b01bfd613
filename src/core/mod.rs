//! Core model types and logic.
//!
//! This module contains the pure, passive half of the engine:
//! - Key traits naming states and events
//! - States, regions, pseudostates and transitions
//! - The immutable `MachineModel` graph and its queries
//! - Guards, actions and the read-only context they observe
//! - The journal of committed transitions
//!
//! Nothing here mutates a running machine. Guards and actions only
//! describe effects; the engine decides when to run them.

mod action;
mod context;
mod guard;
mod journal;
mod key;
mod model;
mod pseudostate;
mod state;
mod transition;

pub use action::{Action, ActionError, ActionFn};
pub use context::{Stage, StateContext, Variables};
pub use guard::{Guard, GuardError, GuardFn};
pub use journal::{Cause, TransitionJournal, TransitionRecord};
pub use key::{EventKey, StateKey};
pub use model::{MachineModel, TimerSpec, Vertex};
pub use pseudostate::{Branch, HistoryDepth, PseudoState, PseudoStateKind};
pub use state::{Initial, Region, RegionId, StateDef, StateKind};
pub use transition::{Transition, TransitionKind, Trigger};
