//! Statecraft: a hierarchical statechart engine with a pure core.
//!
//! The core of the crate is a pure transition function: from a
//! configuration (state value + context + history) and an event it
//! computes the next configuration together with an ordered list of
//! actions to execute. Side effects never happen inside the core; the
//! cooperative [`interpret`] service executes the returned actions,
//! feeds raised events back until the configuration is stable, and
//! drives delayed sends through a pluggable clock.
//!
//! Supported statechart features: nested (hierarchical) states,
//! parallel regions, shallow and deep history, guards, entry/exit
//! actions, internal events, delayed events, activities, and an
//! immutable context updated by assignment actions.
//!
//! # Example
//!
//! ```rust
//! use statecraft::{Machine, StateConfig};
//!
//! let machine: Machine<()> = Machine::builder("light")
//!     .initial("green")
//!     .state("green", StateConfig::new().on("TIMER", "yellow"))
//!     .state("yellow", StateConfig::new().on("TIMER", "red"))
//!     .state(
//!         "red",
//!         StateConfig::new()
//!             .initial("walk")
//!             .state("walk", StateConfig::new().on("PED_TIMER", "wait"))
//!             .state("wait", StateConfig::new().on("PED_TIMER", "stop"))
//!             .state("stop", StateConfig::new())
//!             .on("TIMER", "green"),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let state = machine.transition(machine.initial_state(), "TIMER").unwrap();
//! assert!(state.matches("yellow"));
//!
//! let state = machine.transition_value("red.walk", "PED_TIMER").unwrap();
//! assert!(state.matches("red.wait"));
//! ```

pub mod action;
pub mod context;
pub mod event;
pub mod guard;
pub mod history;
pub mod interpreter;
pub mod machine;
pub mod state;
pub mod value;

// Re-export the working vocabulary at the crate root.
pub use action::{
    assign, cancel, exec, invoke, log, log_message, pure, raise, send, send_expr, try_assign,
    Action, ActionError, ActionKind, Activity, ActivityFn, ActivityHandle,
};
pub use context::{update_context, Context};
pub use event::Event;
pub use guard::{Guard, GuardMeta};
pub use history::HistoryValue;
pub use interpreter::{
    interpret, Clock, LogEntry, Service, ServiceError, SimulatedClock, Subscription, SystemClock,
};
pub use machine::{
    DefinitionError, HistoryKind, Machine, MachineBuilder, StateConfig, TransitionConfig,
    TransitionError,
};
pub use state::{Snapshot, State};
pub use value::StateValue;
