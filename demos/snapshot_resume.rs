//! Snapshot and Resume
//!
//! This example checkpoints a document review after every committed
//! transition, stops the machine mid-review and resumes a fresh machine from
//! a snapshot of where it stopped.
//!
//! Key concepts:
//! - Persisting snapshots through a `StatePersister`
//! - JSON for readable checkpoints, bincode for compact ones
//! - Restoring variables, deep history and deferred events
//!
//! Run with: cargo run --example snapshot_resume

use serde_json::{json, Value};
use statecraft::builder::{HistoryBuilder, ModelBuilder, StateBuilder, StateMachineBuilder, TransitionBuilder};
use statecraft::checkpoint::{InMemoryPersister, Snapshot};
use statecraft::core::{Action, MachineModel, StateContext, Variables};
use statecraft::key_enum;
use std::sync::Arc;

key_enum! {
    enum Review {
        Draft,
        InReview,
        Reading,
        Commenting,
        OnHold,
        Approved,
        Back,
    }
}

key_enum! {
    enum Cmd {
        Submit,
        Comment,
        Read,
        Hold,
        Resume,
        Approve,
    }
}

fn on(from: Review, to: Review, cmd: Cmd) -> TransitionBuilder<Review, Cmd, ()> {
    TransitionBuilder::new().from(from).to(to).on(cmd)
}

fn count_comments() -> Action<Review, Cmd, ()> {
    Action::update(|ctx: &StateContext<Review, Cmd>| {
        let seen = ctx.variable("comments").and_then(Value::as_u64).unwrap_or(0);
        let mut updates = Variables::new();
        updates.insert("comments".to_string(), json!(seen + 1));
        Ok(updates)
    })
}

fn model() -> Result<MachineModel<Review, Cmd, ()>, statecraft::BuildError> {
    ModelBuilder::new()
        .state(StateBuilder::new(Review::Draft).initial())
        .state(StateBuilder::new(Review::InReview))
        .state(StateBuilder::new(Review::Reading).child_of(Review::InReview).initial())
        .state(
            StateBuilder::new(Review::Commenting)
                .child_of(Review::InReview)
                .entry(count_comments()),
        )
        // Approval has to wait until the review is back in progress
        .state(StateBuilder::new(Review::OnHold).defer(Cmd::Approve))
        .state(StateBuilder::new(Review::Approved).final_state())
        .history(Review::Back, HistoryBuilder::deep(Review::InReview))
        .transition(on(Review::Draft, Review::InReview, Cmd::Submit))
        .transition(on(Review::Reading, Review::Commenting, Cmd::Comment))
        .transition(on(Review::Commenting, Review::Reading, Cmd::Read))
        .transition(on(Review::InReview, Review::OnHold, Cmd::Hold))
        .transition(on(Review::OnHold, Review::Back, Cmd::Resume))
        .transition(on(Review::InReview, Review::Approved, Cmd::Approve))
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Snapshot and Resume Example ===\n");

    let persister = Arc::new(InMemoryPersister::new());

    println!("Run 1: reviewing until the reviewer goes on hold");
    println!("----------------------------------------");
    let first = StateMachineBuilder::new(model()?, ())
        .persister(Arc::clone(&persister))
        .build()?;
    first.start().await?;
    for cmd in [Cmd::Submit, Cmd::Comment, Cmd::Hold, Cmd::Approve] {
        let outcome = first.send(cmd).await?;
        println!("  {:<8} -> {:?}", cmd.name(), outcome.status);
    }
    println!("  active:   {:?}", first.active_states().await);
    println!("  persisted {} checkpoints, one per committed transition", persister.len());

    // The deferred approval is not a commit, so take a final snapshot by hand
    let latest = first.snapshot().await;
    first.stop().await;
    println!("  [INTERRUPT] machine stopped\n");

    let json = latest.to_json()?;
    let bytes = latest.to_bytes()?;
    println!("Checkpoint sizes: {} bytes as JSON, {} bytes as bincode\n", json.len(), bytes.len());

    println!("Run 2: resuming from the checkpoint");
    println!("----------------------------------------");
    let second = StateMachineBuilder::new(model()?, ())
        .restore(Snapshot::from_bytes(&bytes)?)
        .build()?;
    second.start().await?;
    println!("  restored: {:?}", second.active_states().await);
    println!("  waiting:  {:?}", second.deferred_events().await);

    let outcome = second.send(Cmd::Resume).await?;
    println!("  {:<8} -> {:?}", Cmd::Resume.name(), outcome.status);
    println!("  active:   {:?}", second.active_states().await);
    println!("  comments: {:?}", second.variable("comments").await);
    second.stop().await;

    println!("\nKey Takeaways:");
    println!("- A snapshot carries regions, history, deferred events and variables");
    println!("- Restoring skips the initial transition and resumes where the machine stopped");
    println!("- The deferred approval was delivered once the review resumed");

    println!("\n=== Example Complete ===");
    Ok(())
}
