//! The immutable configuration produced by a transition.
//!
//! A [`State`] is a complete snapshot: state value, context, the event
//! that produced it, remembered history, the ordered action list for
//! this step, and the activity map diff. Configurations are values:
//! transitions never mutate the prior one.

use crate::action::Action;
use crate::context::Context;
use crate::event::Event;
use crate::history::HistoryValue;
use crate::value::StateValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An immutable machine configuration.
#[derive(Clone, Debug)]
pub struct State<C> {
    /// The hierarchical state value.
    pub value: StateValue,
    /// The extended state after this step's assignments.
    pub context: C,
    /// The event that produced this configuration.
    pub event: Event,
    /// Remembered subtree values for history nodes.
    pub history: HistoryValue,
    /// Ordered actions for the interpreter to execute. Assignments are
    /// already folded into `context` and stripped from this list.
    pub actions: Vec<Action<C>>,
    /// Which activities are running after this step, keyed by name.
    pub activities: BTreeMap<String, bool>,
    /// True iff value, context, or actions differ from the prior
    /// configuration.
    pub changed: bool,
    /// True once the machine root has reached its final state; every
    /// later transition returns the configuration unchanged.
    pub done: bool,
}

impl<C: Context> State<C> {
    /// Construct a configuration directly from a value and context, for
    /// tests and rehydration. No actions, no history.
    pub fn from(value: impl Into<StateValue>, context: C) -> Self {
        Self {
            value: value.into(),
            context,
            event: Event::init(),
            history: HistoryValue::new(),
            actions: Vec::new(),
            activities: BTreeMap::new(),
            changed: false,
            done: false,
        }
    }

    /// True iff `pattern` is a prefix of this configuration's value in
    /// every region.
    ///
    /// ```rust
    /// use statecraft::State;
    ///
    /// let state = State::from("red.walk", ());
    /// assert!(state.matches("red"));
    /// assert!(state.matches("red.walk"));
    /// assert!(!state.matches("green"));
    /// ```
    pub fn matches(&self, pattern: impl Into<StateValue>) -> bool {
        pattern.into().matches(&self.value)
    }

    /// The serializable part of this configuration. Actions are
    /// deliberately excluded; they are this step's transient output,
    /// not part of the position.
    pub fn snapshot(&self) -> Snapshot<C> {
        Snapshot {
            value: self.value.clone(),
            context: self.context.clone(),
            history: self.history.clone(),
        }
    }
}

/// A persistable record of a configuration: everything needed to resume
/// a machine at a position, excluding the step-transient action list.
/// Rehydrate with `Machine::restore`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "C: Serialize",
    deserialize = "C: serde::de::DeserializeOwned"
))]
pub struct Snapshot<C> {
    /// The hierarchical state value.
    pub value: StateValue,
    /// The extended state.
    pub context: C,
    /// Remembered history subtrees.
    pub history: HistoryValue,
}
