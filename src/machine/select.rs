//! Transition selection: which transitions fire for an event.
//!
//! For every leaf of the current value the selector walks leaf-to-root,
//! consulting each node's transition table for the event type, then for
//! the `*` wildcard, taking the first candidate whose guard passes.
//! Parallel regions select independently; conflicting selections are
//! resolved depth-first, then by document order.

use crate::context::Context;
use crate::event::Event;
use crate::guard::GuardMeta;
use crate::machine::error::TransitionError;
use crate::machine::node::{EventMatcher, NodeId, TransitionDef};
use crate::machine::Machine;
use crate::value::StateValue;
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

/// Select the effective transition set for `event` (or for eventless
/// transitions when `eventless` is set), in document order of source
/// nodes.
pub(crate) fn select<'m, C: Context>(
    machine: &'m Machine<C>,
    value: &StateValue,
    context: &C,
    event: &Event,
    eventless: bool,
) -> Result<Vec<&'m TransitionDef<C>>, TransitionError> {
    let leaves = machine.leaf_ids(value)?;
    let active = machine.active_ids(value)?;

    let mut candidates: Vec<&TransitionDef<C>> = Vec::new();
    let mut seen: HashSet<usize> = HashSet::new();

    for leaf in leaves {
        let mut chain = vec![leaf];
        chain.extend(machine.ancestors(leaf));

        'region: for node_id in chain {
            let node = &machine.nodes[node_id];

            let exact: Vec<&TransitionDef<C>> = node
                .transitions
                .iter()
                .filter(|def| match (&def.event, eventless) {
                    (EventMatcher::Always, true) => true,
                    (EventMatcher::Named(name), false) => name == &event.name,
                    _ => false,
                })
                .collect();

            if !exact.is_empty() {
                for def in exact {
                    if guard_passes(machine, def, value, context, event) {
                        if seen.insert(def.order) {
                            candidates.push(def);
                        }
                        break 'region;
                    }
                }
                // An entry for this event exists but no guard passed;
                // the wildcard is not consulted, the search moves up.
                continue;
            }

            if !eventless {
                for def in node
                    .transitions
                    .iter()
                    .filter(|def| def.event == EventMatcher::Wildcard)
                {
                    if guard_passes(machine, def, value, context, event) {
                        if seen.insert(def.order) {
                            candidates.push(def);
                        }
                        break 'region;
                    }
                }
            }
        }
    }

    Ok(resolve_conflicts(machine, &active, candidates))
}

fn guard_passes<C: Context>(
    machine: &Machine<C>,
    def: &TransitionDef<C>,
    value: &StateValue,
    context: &C,
    event: &Event,
) -> bool {
    let Some(guard) = &def.cond else {
        return true;
    };
    match guard.evaluate(context, event, GuardMeta { state: value }) {
        Ok(enabled) => enabled,
        Err(error) => {
            warn!(
                source = %machine.nodes[def.source].name,
                event = %event.name,
                %error,
                "guard failed; treating as false"
            );
            false
        }
    }
}

/// Drop transitions whose exit sets overlap an already-claimed subtree,
/// preferring deeper sources, then document order. The survivors are
/// returned in document order of their sources.
fn resolve_conflicts<'m, C: Context>(
    machine: &Machine<C>,
    active: &BTreeSet<NodeId>,
    mut candidates: Vec<&'m TransitionDef<C>>,
) -> Vec<&'m TransitionDef<C>> {
    candidates.sort_by(|a, b| {
        let depth_a = machine.nodes[a.source].depth;
        let depth_b = machine.nodes[b.source].depth;
        depth_b.cmp(&depth_a).then(a.order.cmp(&b.order))
    });

    let mut kept: Vec<&TransitionDef<C>> = Vec::new();
    let mut claimed: BTreeSet<NodeId> = BTreeSet::new();
    for def in candidates {
        let exits = exit_set(machine, active, def);
        if exits.is_disjoint(&claimed) {
            claimed.extend(exits.iter().copied());
            kept.push(def);
        }
    }

    kept.sort_by_key(|def| machine.nodes[def.source].order);
    kept
}

/// Active nodes an external transition would exit: every active proper
/// descendant of the transition's LCCA. Internal transitions exit
/// nothing.
pub(crate) fn exit_set<C: Context>(
    machine: &Machine<C>,
    active: &BTreeSet<NodeId>,
    def: &TransitionDef<C>,
) -> BTreeSet<NodeId> {
    if def.internal || def.targets.is_empty() {
        return BTreeSet::new();
    }
    let mut frontier = vec![def.source];
    frontier.extend(def.targets.iter().copied());
    let domain = machine.lcca(&frontier);
    active
        .iter()
        .copied()
        .filter(|&node| machine.is_proper_ancestor(domain, node))
        .collect()
}
