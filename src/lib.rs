//! Statecraft: a hierarchical state machine engine
//!
//! Statecraft keeps Stillwater's "pure core, imperative shell" split. The
//! model (states, regions, pseudostates, transitions) is an immutable graph;
//! guards and actions are described as Effects and only run when the
//! engine's processor takes a transition.
//!
//! # Core Concepts
//!
//! - **Hierarchy**: composite states own regions; orthogonal states own
//!   several regions that are active at the same time
//! - **Pseudostates**: choice, junction, fork, join, history, end and
//!   entry/exit points route transitions before any state is entered
//! - **Run-to-completion**: one event is processed at a time, followed by
//!   completion events and the replay of deferred events
//! - **Fail-closed guards**: a guard that errors never enables a transition
//! - **Accumulated actions**: every action runs; failures are collected
//! - **Checkpoints**: snapshots of the active configuration can be
//!   persisted and restored
//!
//! # Example
//!
//! ```rust
//! use statecraft::builder::{ModelBuilder, StateBuilder, StateMachineBuilder, TransitionBuilder};
//! use statecraft::core::Action;
//! use statecraft::key_enum;
//! use serde_json::json;
//!
//! key_enum! {
//!     enum Door { Closed, Opened, Locked }
//! }
//! key_enum! {
//!     enum Input { Open, Close, Lock }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let model = ModelBuilder::<Door, Input, ()>::new()
//!     .state(StateBuilder::new(Door::Closed).initial().defer(Input::Lock))
//!     .state(StateBuilder::new(Door::Opened).entry(Action::set("opened", json!(true))))
//!     .state(StateBuilder::new(Door::Locked))
//!     .transition(TransitionBuilder::new().from(Door::Closed).to(Door::Opened).on(Input::Open))
//!     .transition(TransitionBuilder::new().from(Door::Opened).to(Door::Closed).on(Input::Close))
//!     .build()
//!     .unwrap();
//!
//! let machine = StateMachineBuilder::new(model, ()).build().unwrap();
//! machine.start().await.unwrap();
//!
//! machine.send(Input::Open).await.unwrap();
//! assert_eq!(machine.active_states().await, vec![Door::Opened]);
//! assert_eq!(machine.variable("opened").await, Some(json!(true)));
//!
//! machine.stop().await;
//! # }
//! ```

pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod effects;
pub mod engine;

// Re-export commonly used types
pub use builder::{BuildError, ModelBuilder, StateBuilder, StateMachineBuilder, TransitionBuilder};
pub use checkpoint::{CheckpointError, Snapshot, StatePersister};
pub use config::{ConfigError, EngineConfig};
pub use core::{Action, EventKey, Guard, MachineModel, StateContext, StateKey};
pub use engine::{
    EngineError, EventOutcome, EventStatus, MachineError, Notification, StateMachine, StateMachineListener,
};
