//! The configuration stepper: from a prior configuration and a selected
//! transition set to the next configuration.
//!
//! Action order is part of the contract: exit actions (leaf-first,
//! document-reverse), then transition actions (sources in document
//! order), then entry actions (root-first, document order), then
//! implicit activity stops and starts. Assignments are folded into the
//! context once per step and stripped from the visible list; dynamic
//! send/log expressions resolve against the new context.

use crate::action::Action;
use crate::context::{collect_assigns, update_context, Context};
use crate::event::Event;
use crate::history::HistoryValue;
use crate::machine::config::HistoryKind;
use crate::machine::error::TransitionError;
use crate::machine::node::{NodeId, NodeKind, TransitionDef};
use crate::machine::{select, Machine};
use crate::state::State;
use crate::value::StateValue;
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Upper bound on eventless microsteps within one `transition` call;
/// exceeding it means the definition cycles without stabilizing.
const MAX_EVENTLESS_MICROSTEPS: usize = 100;

/// Compute the initial configuration: enter from the root, run the
/// eventless transitions to quiescence, fold entry assignments into the
/// initial context.
pub(crate) fn initial_state<C: Context>(
    machine: &Machine<C>,
    context: C,
) -> Result<State<C>, TransitionError> {
    let event = Event::init();
    let mut entered: Vec<NodeId> = Vec::new();
    let mut entered_set: BTreeSet<NodeId> = BTreeSet::new();
    enter_node(
        machine,
        machine.root,
        &BTreeSet::new(),
        &mut entered,
        &mut entered_set,
    );

    let mut raw: Vec<Action<C>> = Vec::new();
    for &id in &entered {
        raw.extend(machine.nodes[id].entry.iter().cloned());
    }
    for &id in &entered {
        for activity in &machine.nodes[id].activities {
            raw.push(Action::Start(activity.clone()));
        }
    }

    let assigns = collect_assigns(&raw);
    let context = update_context(&context, &event, &assigns)?;

    let mut actions: Vec<Action<C>> = Vec::new();
    for action in &raw {
        if matches!(action, Action::Assign(_)) {
            continue;
        }
        actions.push(action.resolve(&context, &event)?);
    }

    let mut done = false;
    push_done_events(machine, &entered, &entered_set, &mut actions, &mut done);

    let leaves = structural_leaves(machine, &entered_set);
    let value = machine.value_of(&leaves);

    let mut state = State::from(value, context);
    state.event = event.clone();
    state.actions = actions;
    state.done = done;
    for &id in &entered {
        for activity in &machine.nodes[id].activities {
            state.activities.insert(activity.name.clone(), true);
        }
    }

    let mut state = settle_eventless(machine, state, &event)?;
    state.changed = false;
    Ok(state)
}

/// Complete a possibly-partial value: named nodes keep their position,
/// unentered compounds fill in their initial states, and missing
/// parallel regions are always made present.
pub(crate) fn resolve_value<C: Context>(
    machine: &Machine<C>,
    value: &StateValue,
) -> Result<StateValue, TransitionError> {
    let path_set = machine.active_ids(value)?;
    let mut entered: Vec<NodeId> = Vec::new();
    let mut entered_set: BTreeSet<NodeId> = BTreeSet::new();
    enter_node(
        machine,
        machine.root,
        &path_set,
        &mut entered,
        &mut entered_set,
    );
    Ok(machine.value_of(&structural_leaves(machine, &entered_set)))
}

/// One invocation of the pure transition function.
pub(crate) fn transition<C: Context>(
    machine: &Machine<C>,
    from: &State<C>,
    event: Event,
) -> Result<State<C>, TransitionError> {
    if event.name.is_empty() {
        return Err(TransitionError::InvalidEvent(event.name));
    }

    let mut from = from.clone();
    from.value = resolve_value(machine, &from.value)?;

    // A done machine is terminal: the configuration no longer moves.
    if from.done {
        let mut state = from;
        state.event = event;
        state.actions = Vec::new();
        state.changed = false;
        return Ok(state);
    }

    let selected = select::select(machine, &from.value, &from.context, &event, false)?;
    let state = if selected.is_empty() {
        let mut state = from;
        state.event = event.clone();
        state.actions = Vec::new();
        state.changed = false;
        state
    } else {
        microstep(machine, &from, &selected, &event)?
    };

    settle_eventless(machine, state, &event)
}

/// Take enabled eventless transitions until the configuration is
/// stable, accumulating their actions onto the step's list.
fn settle_eventless<C: Context>(
    machine: &Machine<C>,
    mut state: State<C>,
    event: &Event,
) -> Result<State<C>, TransitionError> {
    let mut iterations = 0usize;
    loop {
        let always = select::select(machine, &state.value, &state.context, event, true)?;
        if always.is_empty() {
            return Ok(state);
        }
        iterations += 1;
        if iterations > MAX_EVENTLESS_MICROSTEPS {
            return Err(TransitionError::EventlessLoop(iterations));
        }

        let mut next = microstep(machine, &state, &always, event)?;
        let mut actions = std::mem::take(&mut state.actions);
        let changed = state.changed || next.changed;
        actions.extend(std::mem::take(&mut next.actions));
        state = next;
        state.actions = actions;
        state.changed = changed;
    }
}

/// Apply a selected transition set: compute exit and entry sets, order
/// the actions, fold assignments, resolve expressions, update history,
/// and detect done states.
fn microstep<C: Context>(
    machine: &Machine<C>,
    prior: &State<C>,
    selected: &[&TransitionDef<C>],
    event: &Event,
) -> Result<State<C>, TransitionError> {
    let active = machine.active_ids(&prior.value)?;

    let mut exit_ids: BTreeSet<NodeId> = BTreeSet::new();
    let mut entered: Vec<NodeId> = Vec::new();
    let mut entered_set: BTreeSet<NodeId> = BTreeSet::new();

    for def in selected {
        if def.internal || def.targets.is_empty() {
            continue;
        }

        let mut concrete: Vec<NodeId> = Vec::new();
        for &target in &def.targets {
            concrete.extend(resolve_history_targets(machine, target, &prior.history));
        }

        let mut frontier = vec![def.source];
        frontier.extend(concrete.iter().copied());
        let domain = machine.lcca(&frontier);

        for &node in &active {
            if machine.is_proper_ancestor(domain, node) {
                exit_ids.insert(node);
            }
        }

        let mut path_set: BTreeSet<NodeId> = BTreeSet::new();
        for &target in &concrete {
            path_set.insert(target);
            let mut current = target;
            while let Some(parent) = machine.nodes[current].parent {
                if parent == domain {
                    break;
                }
                path_set.insert(parent);
                current = parent;
            }
        }
        for &child in &machine.nodes[domain].children {
            if path_set.contains(&child) {
                enter_node(
                    machine,
                    child,
                    &path_set,
                    &mut entered,
                    &mut entered_set,
                );
            }
        }
    }

    // Exit order: deeper nodes first, later siblings before earlier.
    let mut exits: Vec<NodeId> = exit_ids.iter().copied().collect();
    exits.sort_by_key(|&id| Reverse(machine.nodes[id].order));

    let mut raw: Vec<Action<C>> = Vec::new();
    for &id in &exits {
        raw.extend(machine.nodes[id].exit.iter().cloned());
    }
    for def in selected {
        raw.extend(def.actions.iter().cloned());
    }
    for &id in &entered {
        raw.extend(machine.nodes[id].entry.iter().cloned());
    }
    for &id in &exits {
        for activity in &machine.nodes[id].activities {
            raw.push(Action::Stop(activity.clone()));
        }
    }
    for &id in &entered {
        for activity in &machine.nodes[id].activities {
            raw.push(Action::Start(activity.clone()));
        }
    }

    let assigns = collect_assigns(&raw);
    let context = update_context(&prior.context, event, &assigns)?;

    let mut actions: Vec<Action<C>> = Vec::new();
    for action in &raw {
        if matches!(action, Action::Assign(_)) {
            continue;
        }
        actions.push(action.resolve(&context, event)?);
    }

    let mut history = prior.history.clone();
    for &id in &exits {
        if machine.has_history_child(id) {
            if let Some(subtree) = machine.value_at(&prior.value, id) {
                history = history.record(machine.nodes[id].name.clone(), subtree);
            }
        }
    }

    let mut new_active: BTreeSet<NodeId> = active
        .difference(&exit_ids)
        .copied()
        .collect();
    new_active.extend(entered_set.iter().copied());

    let value = if exits.is_empty() && entered.is_empty() {
        prior.value.clone()
    } else {
        machine.value_of(&structural_leaves(machine, &new_active))
    };

    let mut done = prior.done;
    push_done_events(machine, &entered, &new_active, &mut actions, &mut done);

    let mut activities = prior.activities.clone();
    for &id in &exits {
        for activity in &machine.nodes[id].activities {
            activities.insert(activity.name.clone(), false);
        }
    }
    for &id in &entered {
        for activity in &machine.nodes[id].activities {
            activities.insert(activity.name.clone(), true);
        }
    }

    let changed =
        value != prior.value || !actions.is_empty() || context != prior.context;

    Ok(State {
        value,
        context,
        event: event.clone(),
        history,
        actions,
        activities,
        changed,
        done,
    })
}

/// Enter a node and, per its kind, the descendants it implies: the
/// explicit child on the target path, the initial child otherwise, or
/// every region of a parallel.
fn enter_node<C: Context>(
    machine: &Machine<C>,
    node: NodeId,
    path_set: &BTreeSet<NodeId>,
    entered: &mut Vec<NodeId>,
    entered_set: &mut BTreeSet<NodeId>,
) {
    if entered_set.insert(node) {
        entered.push(node);
    }
    match machine.nodes[node].kind {
        NodeKind::Compound => {
            let explicit = machine.nodes[node]
                .children
                .iter()
                .copied()
                .find(|child| path_set.contains(child));
            if let Some(child) = explicit.or(machine.nodes[node].initial) {
                enter_node(machine, child, path_set, entered, entered_set);
            }
        }
        NodeKind::Parallel => {
            for &child in &machine.nodes[node].children {
                enter_node(machine, child, path_set, entered, entered_set);
            }
        }
        NodeKind::Atomic | NodeKind::Final | NodeKind::History => {}
    }
}

/// Replace a history target with the remembered (or default) concrete
/// targets. Non-history targets pass through.
fn resolve_history_targets<C: Context>(
    machine: &Machine<C>,
    target: NodeId,
    history: &HistoryValue,
) -> Vec<NodeId> {
    let node = &machine.nodes[target];
    if node.kind != NodeKind::History {
        return vec![target];
    }
    let Some(parent) = node.parent else {
        return vec![target];
    };

    let resolved = match history.get(&machine.nodes[parent].name) {
        Some(remembered) => match node.history_kind {
            Some(HistoryKind::Deep) => remembered
                .to_paths()
                .into_iter()
                .filter_map(|path| {
                    let mut current = parent;
                    for key in &path {
                        current = machine.child_by_key(current, key)?;
                    }
                    Some(current)
                })
                .collect(),
            // Shallow: the remembered immediate children, re-entered
            // through their own initial states.
            _ => {
                let keys: Vec<String> = match remembered {
                    StateValue::Leaf(key) => vec![key.clone()],
                    StateValue::Branch(regions) => regions.keys().cloned().collect(),
                };
                keys.iter()
                    .filter_map(|key| machine.child_by_key(parent, key))
                    .collect()
            }
        },
        None => node.history_default.clone(),
    };

    if resolved.is_empty() {
        // Nothing remembered and no default: enter the parent through
        // its initial states.
        vec![parent]
    } else {
        resolved
    }
}

/// Raise `done.state.<id>` for every compound parent of an entered
/// final node, and for a parallel grandparent once all its regions are
/// final. Sets the terminal flag when the machine root completes.
fn push_done_events<C: Context>(
    machine: &Machine<C>,
    entered: &[NodeId],
    active: &BTreeSet<NodeId>,
    actions: &mut Vec<Action<C>>,
    done: &mut bool,
) {
    let mut raised: BTreeSet<String> = BTreeSet::new();
    for &id in entered {
        if machine.nodes[id].kind != NodeKind::Final {
            continue;
        }
        let Some(parent) = machine.nodes[id].parent else {
            continue;
        };
        let parent_name = machine.nodes[parent].name.clone();
        if raised.insert(parent_name.clone()) {
            actions.push(Action::Raise(Event::done_state(&parent_name)));
        }
        if parent == machine.root {
            *done = true;
        }
        if let Some(grand) = machine.nodes[parent].parent {
            if machine.nodes[grand].kind == NodeKind::Parallel && machine.in_final(active, grand) {
                let grand_name = machine.nodes[grand].name.clone();
                if raised.insert(grand_name.clone()) {
                    actions.push(Action::Raise(Event::done_state(&grand_name)));
                }
                if grand == machine.root {
                    *done = true;
                }
            }
        }
    }
}

/// Synthetic exit set covering every active node, for a forced
/// interpreter stop: exit actions leaf-first and document-reverse, then
/// activity stops, resolved against the current context.
pub(crate) fn stop_actions<C: Context>(
    machine: &Machine<C>,
    state: &State<C>,
) -> Result<Vec<Action<C>>, TransitionError> {
    let active = machine.active_ids(&state.value)?;
    let mut exits: Vec<NodeId> = active
        .iter()
        .copied()
        .filter(|&id| id != machine.root)
        .collect();
    exits.sort_by_key(|&id| Reverse(machine.nodes[id].order));

    let mut raw: Vec<Action<C>> = Vec::new();
    for &id in &exits {
        raw.extend(machine.nodes[id].exit.iter().cloned());
    }
    for &id in &exits {
        for activity in &machine.nodes[id].activities {
            raw.push(Action::Stop(activity.clone()));
        }
    }

    let mut actions = Vec::new();
    for action in &raw {
        if matches!(action, Action::Assign(_)) {
            continue;
        }
        actions.push(action.resolve(&state.context, &state.event)?);
    }
    Ok(actions)
}

/// Nodes with no active child: the leaves the new value is built from.
fn structural_leaves<C: Context>(machine: &Machine<C>, active: &BTreeSet<NodeId>) -> Vec<NodeId> {
    active
        .iter()
        .copied()
        .filter(|&id| {
            !machine.nodes[id]
                .children
                .iter()
                .any(|child| active.contains(child))
        })
        .collect()
}
