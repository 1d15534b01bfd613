//! Property-based tests for the event-processing engine.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated event sequences.

use proptest::prelude::*;
use serde_json::{json, Value};
use statecraft::builder::{
    BranchBuilder, HistoryBuilder, ModelBuilder, StateBuilder, StateMachineBuilder, TransitionBuilder,
};
use statecraft::core::{Action, MachineModel, StateContext, TransitionJournal, Variables};
use statecraft::engine::StateMachine;
use std::future::Future;

type Model = MachineModel<String, String, ()>;

fn s(key: &str) -> String {
    key.to_string()
}

fn on(from: &str, to: &str, event: &str) -> TransitionBuilder<String, String, ()> {
    TransitionBuilder::new().from(s(from)).to(s(to)).on(s(event))
}

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn counter(key: &'static str) -> Action<String, String, ()> {
    Action::update(move |ctx: &StateContext<String, String>| {
        let current = ctx.variable(key).and_then(Value::as_u64).unwrap_or(0);
        let mut updates = Variables::new();
        updates.insert(key.to_string(), json!(current + 1));
        Ok(updates)
    })
}

/// Appends `entry` to the `log` array variable.
fn append(entry: usize) -> Action<String, String, ()> {
    Action::update(move |ctx: &StateContext<String, String>| {
        let mut log = ctx
            .variable("log")
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        log.push(json!(entry));
        let mut updates = Variables::new();
        updates.insert("log".to_string(), Value::Array(log));
        Ok(updates)
    })
}

/// Orthogonal workflow with a choice, deep history and deferral.
fn workflow() -> Model {
    ModelBuilder::new()
        .state(StateBuilder::new(s("Idle")).initial().defer(s("step")))
        .state(StateBuilder::new(s("Work")))
        .state(StateBuilder::new(s("A1")).in_region(s("Work"), "a").initial())
        .state(StateBuilder::new(s("A2")).in_region(s("Work"), "a"))
        .state(StateBuilder::new(s("B1")).in_region(s("Work"), "b").initial())
        .state(StateBuilder::new(s("B2")).in_region(s("Work"), "b"))
        .state(StateBuilder::new(s("Done")).defer(s("flip")))
        .choice(
            s("gate"),
            BranchBuilder::<String, String, ()>::new()
                .when(
                    |ctx| ctx.variable("steps").and_then(Value::as_u64).unwrap_or(0) > 2,
                    s("B2"),
                )
                .otherwise(s("B1")),
        )
        .history(s("resume"), HistoryBuilder::deep(s("Work")).in_region("a"))
        .transition(on("Idle", "Work", "start"))
        .transition(on("A1", "A2", "step").action(counter("steps")))
        .transition(on("A2", "A1", "step").action(counter("steps")))
        .transition(on("B1", "gate", "flip"))
        .transition(on("B2", "B1", "flip"))
        .transition(on("Work", "Done", "stop"))
        .transition(on("Done", "resume", "start"))
        .build()
        .unwrap()
}

async fn run(model: Model, events: &[String]) -> (Vec<String>, Vec<Vec<String>>, Variables) {
    let machine: StateMachine<String, String, ()> = StateMachineBuilder::new(model, ()).build().unwrap();
    machine.start().await.unwrap();
    for event in events {
        machine.send(event.clone()).await.unwrap();
    }

    let active = machine.active_states().await;
    let journal: TransitionJournal<String, String> = machine.journal().await;
    let path = journal.records().map(|r| r.to.clone()).collect();
    let variables = machine.snapshot().await.variables;
    machine.stop().await;
    (active, path, variables)
}

prop_compose! {
    fn arbitrary_event()(variant in 0..4u8) -> String {
        match variant {
            0 => s("start"),
            1 => s("step"),
            2 => s("flip"),
            _ => s("stop"),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn processing_is_deterministic(events in prop::collection::vec(arbitrary_event(), 0..30)) {
        let first = block_on(run(workflow(), &events));
        let second = block_on(run(workflow(), &events));

        prop_assert_eq!(first, second);
    }

    #[test]
    fn deferred_events_are_delivered_once_in_order(
        pending in prop::collection::vec(0..4usize, 0..12)
    ) {
        let mut closed = StateBuilder::new(s("Closed")).initial();
        for i in 0..4 {
            closed = closed.defer(format!("e{i}"));
        }
        // Hall neither accepts nor defers the pending events.
        let model = ModelBuilder::new()
            .state(closed)
            .state(StateBuilder::new(s("Hall")))
            .state(StateBuilder::new(s("Open")))
            .transition(on("Closed", "Hall", "open"))
            .transition(on("Hall", "Open", "enter"))
            .transitions((0..4).map(|i| {
                TransitionBuilder::new()
                    .from(s("Open"))
                    .on(format!("e{i}"))
                    .internal()
                    .action(append(i))
            }))
            .build()
            .unwrap();

        let mut events: Vec<String> = pending.iter().map(|i| format!("e{i}")).collect();
        events.push(s("open"));
        events.push(s("enter"));
        let (active, _, variables) = block_on(run(model, &events));

        let delivered: Vec<usize> = variables
            .get("log")
            .and_then(Value::as_array)
            .map(|log| log.iter().filter_map(Value::as_u64).map(|i| i as usize).collect())
            .unwrap_or_default();
        prop_assert_eq!(active, vec![s("Open")]);
        prop_assert_eq!(delivered, pending);
    }

    #[test]
    fn choice_takes_first_true_branch(guards in prop::collection::vec(any::<bool>(), 1..6)) {
        let mut branches = BranchBuilder::<String, String, ()>::new();
        let mut builder = ModelBuilder::new()
            .state(StateBuilder::new(s("Idle")).initial())
            .state(StateBuilder::new(s("Fallback")));
        for (i, &holds) in guards.iter().enumerate() {
            branches = branches.when(move |_| holds, format!("T{i}"));
            builder = builder.state(StateBuilder::new(format!("T{i}")));
        }
        let model = builder
            .choice(s("pick"), branches.otherwise(s("Fallback")))
            .transition(on("Idle", "pick", "go"))
            .build()
            .unwrap();

        let (active, _, _) = block_on(run(model, &[s("go")]));

        let expected = guards
            .iter()
            .position(|&holds| holds)
            .map(|i| format!("T{i}"))
            .unwrap_or_else(|| s("Fallback"));
        prop_assert_eq!(active, vec![expected]);
    }
}
