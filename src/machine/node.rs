//! The normalized, immutable state-node arena.
//!
//! Nodes are stored in a flat arena indexed by [`NodeId`]; parent,
//! child, and transition-target references are ids, so logical cycles
//! (A→B→A) never become owned pointers.

use crate::action::{Action, Activity};
use crate::guard::Guard;
use crate::machine::config::HistoryKind;

/// Arena index of a state node.
pub(crate) type NodeId = usize;

/// What a node is, after normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Atomic,
    Compound,
    Parallel,
    Final,
    History,
}

/// How an event descriptor matches incoming events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum EventMatcher {
    /// Matches events with exactly this name.
    Named(String),
    /// The `*` fallback, consulted when no named descriptor matched.
    Wildcard,
    /// Eventless: evaluated after every microstep until quiescent.
    Always,
}

/// A normalized transition.
pub(crate) struct TransitionDef<C> {
    pub(crate) source: NodeId,
    pub(crate) event: EventMatcher,
    /// Resolved target ids; empty for targetless transitions.
    pub(crate) targets: Vec<NodeId>,
    pub(crate) cond: Option<Guard<C>>,
    pub(crate) actions: Vec<Action<C>>,
    /// Internal transitions fire actions without exiting their source.
    pub(crate) internal: bool,
    /// Global document-order index, unique per transition.
    pub(crate) order: usize,
}

/// A node in the state tree.
pub(crate) struct StateNode<C> {
    pub(crate) id: NodeId,
    /// Local key within the parent.
    pub(crate) key: String,
    /// Full id: machine id plus the delimited path from the root.
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    /// Distance from the root (root = 0).
    pub(crate) depth: usize,
    /// Preorder document index; drives every tie-break.
    pub(crate) order: usize,
    /// Resolved initial child for compound nodes.
    pub(crate) initial: Option<NodeId>,
    /// Children in document order.
    pub(crate) children: Vec<NodeId>,
    pub(crate) transitions: Vec<TransitionDef<C>>,
    pub(crate) entry: Vec<Action<C>>,
    pub(crate) exit: Vec<Action<C>>,
    pub(crate) activities: Vec<Activity>,
    /// Set iff `kind == History`.
    pub(crate) history_kind: Option<HistoryKind>,
    /// Resolved default target of a history node; empty falls back to
    /// the parent's initial.
    pub(crate) history_default: Vec<NodeId>,
}
