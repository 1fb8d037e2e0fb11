//! Events delivered to the machine, including the reserved built-in
//! vocabulary (`xstate.init`, `done.state.*`, `xstate.after(N)#id`,
//! `error.execution`, `error.platform.*`).

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// The implicit event delivered when a machine computes its initial state.
pub const INIT_EVENT: &str = "xstate.init";

/// Event raised when an execution error aborts a macrostep.
pub const ERROR_EXECUTION_EVENT: &str = "error.execution";

/// A discrete event: a name plus an optional JSON payload.
///
/// # Example
///
/// ```rust
/// use statecraft::Event;
/// use serde_json::json;
///
/// let plain = Event::from("TIMER");
/// let with_payload = Event::new("SUBMIT").with_payload(json!({"value": 7}));
///
/// assert_eq!(plain.name, "TIMER");
/// assert_eq!(with_payload.payload["value"], 7);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The event type.
    pub name: String,
    /// Caller-supplied payload; `Null` when absent.
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub payload: JsonValue,
}

impl Event {
    /// Create a payload-less event.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: JsonValue::Null,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: impl Into<JsonValue>) -> Self {
        self.payload = payload.into();
        self
    }

    /// The implicit initialization event.
    pub fn init() -> Self {
        Event::new(INIT_EVENT)
    }

    /// The `done.state.<id>` event raised when every region under `id`
    /// reaches a final state.
    pub fn done_state(id: &str) -> Self {
        Event::new(format!("done.state.{id}"))
    }

    /// The delay event scheduled by an `after` timer on node `id`.
    /// The name doubles as the send id, so it is stable across
    /// transitions and cancellable on exit.
    pub fn after(delay_ms: u64, id: &str) -> Self {
        Event::new(after_event_name(delay_ms, id))
    }

    /// The `error.platform.<id>` event the interpreter routes unhandled
    /// action errors through.
    pub fn error_platform(id: &str) -> Self {
        Event::new(format!("error.platform.{id}"))
    }

    /// The `error.execution` event surfaced after an aborted macrostep.
    pub fn error_execution() -> Self {
        Event::new(ERROR_EXECUTION_EVENT)
    }
}

/// Name of the delay event (and send id) for an `after` timer.
pub(crate) fn after_event_name(delay_ms: u64, id: &str) -> String {
    format!("xstate.after({delay_ms})#{id}")
}

impl From<&str> for Event {
    fn from(name: &str) -> Self {
        Event::new(name)
    }
}

impl From<String> for Event {
    fn from(name: String) -> Self {
        Event::new(name)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
