//! The machine definition and the pure transition API.
//!
//! A [`Machine`] is built once from a declarative configuration and is
//! read-only afterwards, so configurations of the same definition can be
//! stepped concurrently from any thread. Transitions are computed by
//! pure functions: `(definition, configuration, event)` in, next
//! configuration plus ordered actions out.

pub mod config;
pub mod error;
mod load;
mod node;
mod select;
mod step;

pub use config::{HistoryKind, MachineBuilder, StateConfig, TransitionConfig};
pub use error::{DefinitionError, TransitionError};

use crate::action::ActivityFn;
use crate::context::Context;
use crate::event::Event;
use crate::state::{Snapshot, State};
use crate::value::StateValue;
use node::{NodeId, NodeKind, StateNode};
use std::collections::{BTreeSet, HashMap};

/// A loaded statechart definition.
///
/// # Example
///
/// ```rust
/// use statecraft::{Machine, StateConfig};
///
/// let machine: Machine<()> = Machine::builder("light")
///     .initial("green")
///     .state("green", StateConfig::new().on("TIMER", "yellow"))
///     .state("yellow", StateConfig::new().on("TIMER", "red"))
///     .state("red", StateConfig::new().on("TIMER", "green"))
///     .build()
///     .unwrap();
///
/// let next = machine
///     .transition(machine.initial_state(), "TIMER")
///     .unwrap();
/// assert!(next.matches("yellow"));
/// ```
pub struct Machine<C: Context> {
    pub(crate) id: String,
    pub(crate) delimiter: char,
    pub(crate) nodes: Vec<StateNode<C>>,
    pub(crate) root: NodeId,
    pub(crate) ids: HashMap<String, NodeId>,
    pub(crate) activity_impls: HashMap<String, ActivityFn<C>>,
    /// Computed once at load; `initial_state` hands out the same value
    /// forever.
    pub(crate) initial: Option<State<C>>,
}

impl<C: Context> Machine<C> {
    /// Start building a machine definition.
    pub fn builder(id: impl Into<String>) -> MachineBuilder<C> {
        MachineBuilder::new(id)
    }

    /// The machine's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The configured id delimiter.
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// The initial configuration: initial states entered, entry actions
    /// collected, assignments folded into the initial context. The same
    /// configuration is returned on every call.
    pub fn initial_state(&self) -> &State<C> {
        self.initial
            .as_ref()
            .expect("initial configuration is computed at load")
    }

    /// Compute the next configuration for an event. Pure: neither the
    /// machine nor the prior configuration is touched.
    pub fn transition(
        &self,
        from: &State<C>,
        event: impl Into<Event>,
    ) -> Result<State<C>, TransitionError> {
        step::transition(self, from, event.into())
    }

    /// Transition from a bare value, with the definition's initial
    /// context.
    pub fn transition_value(
        &self,
        value: impl Into<StateValue>,
        event: impl Into<Event>,
    ) -> Result<State<C>, TransitionError> {
        let context = self.initial_state().context.clone();
        self.transition_with_context(value, context, event)
    }

    /// Transition from a bare value with an explicit context.
    pub fn transition_with_context(
        &self,
        value: impl Into<StateValue>,
        context: C,
        event: impl Into<Event>,
    ) -> Result<State<C>, TransitionError> {
        let value = value.into();
        self.active_ids(&value)?;
        let from = State::from(value, context);
        step::transition(self, &from, event.into())
    }

    /// Rehydrate a configuration from a [`Snapshot`], validating the
    /// value against this definition and recomputing the activity map.
    pub fn restore(&self, snapshot: Snapshot<C>) -> Result<State<C>, TransitionError> {
        let value = step::resolve_value(self, &snapshot.value)?;
        let active = self.active_ids(&value)?;
        let mut state = State::from(value, snapshot.context);
        state.history = snapshot.history;
        for &id in &active {
            for activity in &self.nodes[id].activities {
                state.activities.insert(activity.name.clone(), true);
            }
        }
        Ok(state)
    }

    pub(crate) fn activity_impl(&self, name: &str) -> Option<&ActivityFn<C>> {
        self.activity_impls.get(name)
    }

    /// Actions for a forced stop: the synthetic exit of every active
    /// node, so exit actions and activity stops run deterministically.
    pub(crate) fn stop_actions(
        &self,
        state: &State<C>,
    ) -> Result<Vec<crate::action::Action<C>>, TransitionError> {
        step::stop_actions(self, state)
    }

    // ---- tree helpers -------------------------------------------------

    pub(crate) fn child_by_key(&self, parent: NodeId, key: &str) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes[child].key == key)
    }

    /// Proper ancestors, parent first, root last.
    pub(crate) fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = node;
        while let Some(parent) = self.nodes[current].parent {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    pub(crate) fn is_proper_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = node;
        while let Some(parent) = self.nodes[current].parent {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Keys from the root (exclusive) down to the node.
    pub(crate) fn path_keys(&self, node: NodeId) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let mut current = node;
        while let Some(parent) = self.nodes[current].parent {
            keys.push(self.nodes[current].key.clone());
            current = parent;
        }
        keys.reverse();
        keys
    }

    /// Every node a value denotes: the named nodes plus all their
    /// ancestors, root included.
    pub(crate) fn active_ids(
        &self,
        value: &StateValue,
    ) -> Result<BTreeSet<NodeId>, TransitionError> {
        let mut active = BTreeSet::new();
        active.insert(self.root);
        for path in value.to_paths() {
            let mut current = self.root;
            for key in &path {
                current = self
                    .child_by_key(current, key)
                    .ok_or_else(|| TransitionError::InvalidValue(value.to_string()))?;
                active.insert(current);
            }
        }
        Ok(active)
    }

    /// The leaf nodes a value denotes, in document order.
    pub(crate) fn leaf_ids(&self, value: &StateValue) -> Result<Vec<NodeId>, TransitionError> {
        let mut leaves = Vec::new();
        for path in value.to_paths() {
            let mut current = self.root;
            for key in &path {
                current = self
                    .child_by_key(current, key)
                    .ok_or_else(|| TransitionError::InvalidValue(value.to_string()))?;
            }
            leaves.push(current);
        }
        leaves.sort_by_key(|&id| self.nodes[id].order);
        leaves.dedup();
        Ok(leaves)
    }

    /// Rebuild a value from a leaf set.
    pub(crate) fn value_of(&self, leaves: &[NodeId]) -> StateValue {
        let mut ordered: Vec<NodeId> = leaves.to_vec();
        ordered.sort_by_key(|&id| self.nodes[id].order);
        StateValue::from_paths(ordered.iter().map(|&id| self.path_keys(id)))
    }

    /// Least common compound ancestor: the deepest proper ancestor of
    /// every given node that is compound (or the root). Determines the
    /// exit/entry frontier of an external transition.
    pub(crate) fn lcca(&self, nodes: &[NodeId]) -> NodeId {
        let Some((&first, rest)) = nodes.split_first() else {
            return self.root;
        };
        let mut chain = self.ancestors(first);
        for &other in rest {
            let other_chain = self.ancestors(other);
            chain.retain(|id| other_chain.contains(id));
        }
        chain
            .into_iter()
            .find(|&id| id == self.root || self.nodes[id].kind == NodeKind::Compound)
            .unwrap_or(self.root)
    }

    pub(crate) fn has_history_child(&self, node: NodeId) -> bool {
        self.nodes[node]
            .children
            .iter()
            .any(|&child| self.nodes[child].kind == NodeKind::History)
    }

    /// The value of `node`'s subtree within a larger value, if present.
    pub(crate) fn value_at(&self, value: &StateValue, node: NodeId) -> Option<StateValue> {
        let mut current = value.clone();
        for key in self.path_keys(node) {
            match current {
                StateValue::Branch(mut regions) => {
                    current = regions.remove(&key)?;
                }
                StateValue::Leaf(_) => return None,
            }
        }
        Some(current)
    }

    /// "In a final state": a compound node whose active child is final,
    /// or a parallel node whose regions all are.
    pub(crate) fn in_final(&self, active: &BTreeSet<NodeId>, node: NodeId) -> bool {
        match self.nodes[node].kind {
            NodeKind::Final => true,
            NodeKind::Compound => self.nodes[node].children.iter().any(|&child| {
                self.nodes[child].kind == NodeKind::Final && active.contains(&child)
            }),
            NodeKind::Parallel => self.nodes[node]
                .children
                .iter()
                .all(|&child| self.in_final(active, child)),
            NodeKind::Atomic | NodeKind::History => false,
        }
    }
}
