//! Delayed Transitions Under a Simulated Clock
//!
//! This example demonstrates the interpreter: delayed sends scheduled on
//! entry, `after` timers, and a simulated clock advanced by hand so the
//! whole run is deterministic.
//!
//! Key concepts:
//! - `interpret` drives a machine as a service
//! - Entry-time `send(...).delay(ms)` and declarative `after` timers
//! - `SimulatedClock::increment` firing due timers in order
//!
//! Run with: cargo run --example delayed_lights

use statecraft::{interpret, send, Machine, SimulatedClock, StateConfig};
use std::sync::Arc;

fn main() {
    tracing_subscriber::fmt::init();

    println!("=== Delayed Lights ===\n");

    let machine: Machine<()> = Machine::builder("lights")
        .initial("green")
        .state(
            "green",
            StateConfig::new()
                .entry(send("TIMER").delay(10))
                .on("TIMER", "yellow"),
        )
        .state("yellow", StateConfig::new().after(10, "red"))
        .state("red", StateConfig::new().after(10, "green"))
        .build()
        .expect("lights machine builds");

    let clock = Arc::new(SimulatedClock::new());
    let service = interpret(machine).with_clock(clock.clone());

    let _watcher = service.on_transition(|state| {
        println!("        -> {}", state.value);
    });

    service.start().expect("service starts");

    for _ in 0..4 {
        println!("t = {:>2} ms: {}", clock.now(), service.state().value);
        clock.increment(10);
    }
    println!("t = {:>2} ms: {}", clock.now(), service.state().value);

    service.stop().expect("service stops");

    println!("\nEach state arms a 10 ms timer on entry; advancing the");
    println!("simulated clock fires them in order, so the run above is");
    println!("reproducible down to the millisecond.");

    println!("\n=== Example Complete ===");
}
