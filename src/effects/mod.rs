//! Effectful invocation of guards and actions using Stillwater 0.11.0.
//!
//! This module is the imperative shell around the pure model: it runs the
//! effects that guards and actions describe against the machine environment.
//!
//! # Key Concepts
//!
//! - **Fail-closed guards**: a guard that errors is treated as `false`
//! - **Accumulated actions**: every action in a list runs; failures are
//!   collected with `Validation` instead of stopping at the first one
//! - **Environment pattern**: effects read capabilities from `Env`

mod invoker;

pub use invoker::{failures, ActionFailure, Invoker, Verdict};
