//! Word Editor Formatting Statechart
//!
//! This example demonstrates parallel (orthogonal) regions: four
//! formatting toggles that are all active at once and move
//! independently.
//!
//! Key concepts:
//! - A parallel root: one region per formatting concern
//! - Region-local transitions that never perturb sibling regions
//! - Prefix matching on a multi-region value
//!
//! Run with: cargo run --example word_editor

use statecraft::{Machine, StateConfig};

fn main() {
    tracing_subscriber::fmt::init();

    println!("=== Word Editor Statechart ===\n");

    let toggle = |event: &str| {
        StateConfig::new()
            .initial("off")
            .state("on", StateConfig::new().on(event, "off"))
            .state("off", StateConfig::new().on(event, "on"))
    };

    let machine: Machine<()> = Machine::builder("word")
        .parallel()
        .state("bold", toggle("TOGGLE_BOLD"))
        .state("italics", toggle("TOGGLE_ITALICS"))
        .state("underline", toggle("TOGGLE_UNDERLINE"))
        .state(
            "list",
            StateConfig::new()
                .initial("none")
                .state(
                    "none",
                    StateConfig::new()
                        .on("BULLETS", "bullets")
                        .on("NUMBERS", "numbers"),
                )
                .state(
                    "bullets",
                    StateConfig::new().on("NONE", "none").on("NUMBERS", "numbers"),
                )
                .state(
                    "numbers",
                    StateConfig::new().on("NONE", "none").on("BULLETS", "bullets"),
                ),
        )
        .build()
        .expect("word machine builds");

    let mut state = machine.initial_state().clone();
    println!("initial:          {}", state.value);

    for event in ["TOGGLE_BOLD", "BULLETS", "TOGGLE_ITALICS", "TOGGLE_BOLD"] {
        state = machine.transition(&state, event).expect("transition");
        println!("{event:>16} -> {}", state.value);
    }

    println!();
    println!("bold active?   {}", state.matches("bold.on"));
    println!("bullet list?   {}", state.matches("list.bullets"));

    println!("\n=== Example Complete ===");
}
