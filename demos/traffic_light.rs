//! Traffic Light Statechart
//!
//! This example demonstrates a hierarchical machine: a flat light cycle
//! whose `red` state nests pedestrian substates.
//!
//! Key concepts:
//! - Flat transitions between sibling states
//! - Nested states handling their own events
//! - Events bubbling to the parent when the child ignores them
//!
//! Run with: cargo run --example traffic_light

use statecraft::{Machine, StateConfig};

fn main() {
    tracing_subscriber::fmt::init();

    println!("=== Traffic Light Statechart ===\n");

    let machine: Machine<()> = Machine::builder("light")
        .initial("green")
        .state("green", StateConfig::new().on("TIMER", "yellow"))
        .state("yellow", StateConfig::new().on("TIMER", "red"))
        .state(
            "red",
            StateConfig::new()
                .initial("walk")
                .state("walk", StateConfig::new().on("PED_TIMER", "wait"))
                .state("wait", StateConfig::new().on("PED_TIMER", "stop"))
                .state("stop", StateConfig::new())
                .on("TIMER", "green"),
        )
        .build()
        .expect("light machine builds");

    let mut state = machine.initial_state().clone();
    println!("initial:    {}", state.value);

    for event in ["TIMER", "TIMER", "PED_TIMER", "PED_TIMER", "TIMER"] {
        state = machine.transition(&state, event).expect("transition");
        println!("{event:>10} -> {}", state.value);
    }

    println!();
    println!("Entering red lands on its initial child (red.walk);");
    println!("PED_TIMER advances the pedestrian substate, while TIMER");
    println!("bubbles up to red itself and brings the cycle back to green.");

    println!("\n=== Example Complete ===");
}
