//! Order Fulfilment
//!
//! This example runs an order through two orthogonal regions, payment and
//! shipping, that meet at a join before the order ships.
//!
//! Key concepts:
//! - Orthogonal regions advancing independently on the same event stream
//! - A join that parks until every source region has arrived
//! - Deferred events replayed once the machine reaches a state that accepts them
//! - Listeners receiving notifications synchronously
//!
//! Run with: cargo run --example order_fulfilment

use serde_json::json;
use statecraft::builder::{ModelBuilder, StateBuilder, StateMachineBuilder, TransitionBuilder};
use statecraft::core::Action;
use statecraft::engine::Notification;
use statecraft::key_enum;

key_enum! {
    enum Step {
        Cart,
        Order,
        AwaitingPayment,
        Paid,
        Packing,
        Packed,
        Ready,
        Shipped,
    }
}

key_enum! {
    enum Signal {
        Place,
        Pay,
        Pack,
        Ship,
    }
}

fn on(from: Step, to: Step, event: Signal) -> TransitionBuilder<Step, Signal, ()> {
    TransitionBuilder::new().from(from).to(to).on(event)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Order Fulfilment Example ===\n");

    let model = ModelBuilder::new()
        // Paying before the order is placed is held back, not lost
        .state(StateBuilder::new(Step::Cart).initial().defer(Signal::Pay))
        .state(StateBuilder::new(Step::Order))
        .state(
            StateBuilder::new(Step::AwaitingPayment)
                .in_region(Step::Order, "payment")
                .initial(),
        )
        .state(
            StateBuilder::new(Step::Paid)
                .in_region(Step::Order, "payment")
                .entry(Action::set("paid", json!(true))),
        )
        .state(StateBuilder::new(Step::Packing).in_region(Step::Order, "shipping").initial())
        .state(StateBuilder::new(Step::Packed).in_region(Step::Order, "shipping"))
        .state(StateBuilder::new(Step::Shipped).final_state())
        .join(Step::Ready, vec![Step::Paid, Step::Packed], Step::Shipped)
        .transition(on(Step::Cart, Step::Order, Signal::Place))
        .transition(on(Step::AwaitingPayment, Step::Paid, Signal::Pay))
        .transition(on(Step::Packing, Step::Packed, Signal::Pack))
        .transition(on(Step::Paid, Step::Ready, Signal::Ship))
        .transition(on(Step::Packed, Step::Ready, Signal::Ship))
        .build()?;

    let machine = StateMachineBuilder::new(model, ())
        .listener(|notification: &Notification<Step, Signal>| match notification {
            Notification::StateChanged { to, .. } => println!("  [changed]  {to:?}"),
            Notification::EventDeferred(event) => println!("  [deferred] {event}"),
            Notification::JoinParked { join, arrived } => println!("  [parked]   {join} has {arrived:?}"),
            _ => {}
        })
        .build()?;
    machine.start().await?;

    for signal in [Signal::Pay, Signal::Place, Signal::Pack, Signal::Ship] {
        println!("send {signal}");
        let outcome = machine.send(signal).await?;
        println!("  -> {:?}", outcome.status);
    }

    println!("\nFinal configuration: {:?}", machine.active_states().await);
    println!("Paid flag: {:?}", machine.variable("paid").await);
    machine.stop().await;

    println!("\nKey Takeaways:");
    println!("- Each region keeps its own active state");
    println!("- The join fires only once payment and packing have both arrived");
    println!("- Pay sent too early was replayed as soon as the order existed");

    println!("\n=== Example Complete ===");
    Ok(())
}
