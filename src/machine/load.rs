//! Normalization of a declarative configuration into the node arena.
//!
//! Loading walks the [`StateConfig`] tree in document order, allocates
//! arena nodes, rewrites the declarative shorthands into plain
//! transitions (`after` timers, `on_done` handlers, wildcard and
//! eventless descriptors), resolves every static target and named
//! guard, and finally precomputes the initial configuration.

use crate::action::{cancel, send, Action, Activity, ActivityFn, ExecFn};
use crate::context::Context;
use crate::event::{after_event_name, Event};
use crate::guard::GuardFn;
use crate::machine::config::{ConfigKind, MachineBuilder, StateConfig, TransitionConfig};
use crate::machine::error::DefinitionError;
use crate::machine::node::{EventMatcher, NodeId, NodeKind, StateNode, TransitionDef};
use crate::machine::{step, Machine};
use std::collections::HashMap;
use tracing::warn;

/// Declarative leftovers kept per node until the whole arena exists and
/// targets can resolve.
struct Pending<C> {
    initial_key: Option<String>,
    on: Vec<(String, TransitionConfig<C>)>,
    always: Vec<TransitionConfig<C>>,
    after: Vec<(u64, TransitionConfig<C>)>,
    on_done: Vec<TransitionConfig<C>>,
    history_target: Option<String>,
}

struct Loader<C> {
    delimiter: char,
    nodes: Vec<StateNode<C>>,
    pending: Vec<Pending<C>>,
    ids: HashMap<String, NodeId>,
    action_impls: HashMap<String, ExecFn<C>>,
    activity_impls: HashMap<String, ActivityFn<C>>,
    guard_impls: HashMap<String, GuardFn<C>>,
}

pub(crate) fn load<C>(builder: MachineBuilder<C>) -> Result<Machine<C>, DefinitionError>
where
    C: Context + Default,
{
    let MachineBuilder {
        id,
        root,
        context,
        delimiter,
        guards,
        actions,
        activities,
    } = builder;

    let mut loader = Loader {
        delimiter,
        nodes: Vec::new(),
        pending: Vec::new(),
        ids: HashMap::new(),
        action_impls: actions,
        activity_impls: activities,
        guard_impls: guards,
    };

    let root_id = loader.alloc(root, id.clone(), id.clone(), None, 0)?;
    loader.validate_structure()?;
    let transitions = loader.build_transitions()?;
    let history_defaults = loader.resolve_history_defaults()?;

    for (node, defs) in transitions {
        loader.nodes[node].transitions = defs;
    }
    for (node, targets) in history_defaults {
        loader.nodes[node].history_default = targets;
    }

    let mut machine = Machine {
        id,
        delimiter,
        nodes: loader.nodes,
        root: root_id,
        ids: loader.ids,
        activity_impls: loader.activity_impls,
        initial: None,
    };

    let initial = step::initial_state(&machine, context.unwrap_or_default())
        .map_err(|err| DefinitionError::InitialState(err.to_string()))?;
    machine.initial = Some(initial);

    Ok(machine)
}

impl<C: Context> Loader<C> {
    /// Allocate a node and, preorder, its children. The allocation
    /// index doubles as the document-order index.
    fn alloc(
        &mut self,
        config: StateConfig<C>,
        key: String,
        name: String,
        parent: Option<NodeId>,
        depth: usize,
    ) -> Result<NodeId, DefinitionError> {
        if parent.is_some() && key.contains(self.delimiter) {
            return Err(DefinitionError::DelimiterInKey {
                key,
                delimiter: self.delimiter,
            });
        }

        let id = self.nodes.len();
        if self.ids.insert(name.clone(), id).is_some() {
            return Err(DefinitionError::DuplicateId(name));
        }
        if let Some(custom) = &config.id {
            if self.ids.insert(custom.clone(), id).is_some() {
                return Err(DefinitionError::DuplicateId(custom.clone()));
            }
        }

        let kind = match config.kind {
            ConfigKind::Normal if config.states.is_empty() => NodeKind::Atomic,
            ConfigKind::Normal => NodeKind::Compound,
            ConfigKind::Parallel => NodeKind::Parallel,
            ConfigKind::Final => NodeKind::Final,
            ConfigKind::History(_) => NodeKind::History,
        };
        let history_kind = match config.kind {
            ConfigKind::History(h) => Some(h),
            _ => None,
        };

        let activities = config
            .activities
            .iter()
            .map(|activity_name| {
                if !self.activity_impls.contains_key(activity_name) {
                    warn!(activity = %activity_name, node = %name, "no implementation for activity");
                }
                Activity {
                    name: activity_name.clone(),
                    owner: name.clone(),
                }
            })
            .collect();

        let entry = self.resolve_custom_actions(config.entry);
        let exit = self.resolve_custom_actions(config.exit);

        self.nodes.push(StateNode {
            id,
            key,
            name: name.clone(),
            kind,
            parent,
            depth,
            order: id,
            initial: None,
            children: Vec::new(),
            transitions: Vec::new(),
            entry,
            exit,
            activities,
            history_kind,
            history_default: Vec::new(),
        });
        self.pending.push(Pending {
            initial_key: config.initial,
            on: config.on,
            always: config.always,
            after: config.after,
            on_done: config.on_done,
            history_target: config.history_target,
        });

        for (child_key, child_config) in config.states {
            let child_name = format!("{name}{}{child_key}", self.delimiter);
            let child = self.alloc(child_config, child_key, child_name, Some(id), depth + 1)?;
            self.nodes[id].children.push(child);
        }

        Ok(id)
    }

    /// Fill in resolvable named actions; unknown names stay inert with a
    /// warning, matching how interpreters treat unimplemented actions.
    fn resolve_custom_actions(&self, actions: Vec<Action<C>>) -> Vec<Action<C>> {
        actions
            .into_iter()
            .map(|action| match action {
                Action::Custom(mut spec) if spec.exec.is_none() => {
                    match self.action_impls.get(&spec.name) {
                        Some(f) => spec.exec = Some(f.clone()),
                        None => warn!(action = %spec.name, "no implementation for action"),
                    }
                    Action::Custom(spec)
                }
                other => other,
            })
            .collect()
    }

    fn validate_structure(&mut self) -> Result<(), DefinitionError> {
        for id in 0..self.nodes.len() {
            let node = &self.nodes[id];
            let name = node.name.clone();
            match node.kind {
                NodeKind::Compound => {
                    let initial_key = self.pending[id]
                        .initial_key
                        .clone()
                        .ok_or_else(|| DefinitionError::MissingInitial(name.clone()))?;
                    let child = self
                        .child_by_key(id, &initial_key)
                        .ok_or_else(|| DefinitionError::UnknownInitial {
                            state: name.clone(),
                            initial: initial_key.clone(),
                        })?;
                    if self.nodes[child].kind == NodeKind::History {
                        return Err(DefinitionError::HistoryInitial {
                            state: name,
                            initial: initial_key,
                        });
                    }
                    self.nodes[id].initial = Some(child);
                }
                NodeKind::Parallel => {
                    if self.nodes[id].children.is_empty() {
                        return Err(DefinitionError::NoChildStates(name));
                    }
                    for &child in &self.nodes[id].children {
                        if !matches!(
                            self.nodes[child].kind,
                            NodeKind::Compound | NodeKind::Parallel
                        ) {
                            return Err(DefinitionError::InvalidRegion {
                                state: name,
                                child: self.nodes[child].key.clone(),
                            });
                        }
                    }
                }
                NodeKind::Atomic => {
                    // The root must hold at least one state.
                    if self.nodes[id].parent.is_none() {
                        return Err(DefinitionError::NoChildStates(name));
                    }
                }
                NodeKind::Final => {
                    if !self.nodes[id].children.is_empty() {
                        return Err(DefinitionError::FinalWithChildren(name));
                    }
                    let pending = &self.pending[id];
                    if !pending.on.is_empty()
                        || !pending.always.is_empty()
                        || !pending.after.is_empty()
                        || !pending.on_done.is_empty()
                    {
                        return Err(DefinitionError::FinalWithTransitions(name));
                    }
                }
                NodeKind::History => {
                    if !self.nodes[id].children.is_empty() {
                        return Err(DefinitionError::HistoryWithChildren(name));
                    }
                }
            }
        }
        Ok(())
    }

    /// Rewrite every pending descriptor into [`TransitionDef`]s, in
    /// document order, and append the implicit timer actions.
    fn build_transitions(&mut self) -> Result<Vec<(NodeId, Vec<TransitionDef<C>>)>, DefinitionError> {
        let mut order = 0usize;
        let mut out = Vec::new();
        let mut timer_actions: Vec<(NodeId, Action<C>, Action<C>)> = Vec::new();

        for id in 0..self.nodes.len() {
            let pending = std::mem::replace(
                &mut self.pending[id],
                Pending {
                    initial_key: None,
                    on: Vec::new(),
                    always: Vec::new(),
                    after: Vec::new(),
                    on_done: Vec::new(),
                    history_target: None,
                },
            );
            let mut defs = Vec::new();

            for (event, tc) in pending.on {
                let matcher = if event == "*" {
                    EventMatcher::Wildcard
                } else {
                    EventMatcher::Named(event)
                };
                defs.push(self.build_transition(id, matcher, tc, &mut order)?);
            }

            for (delay, tc) in pending.after {
                let event_name = after_event_name(delay, &self.nodes[id].name);
                let entry_send: Action<C> = send(Event::new(event_name.clone()))
                    .delay(delay)
                    .id(event_name.clone())
                    .into();
                timer_actions.push((id, entry_send, cancel(event_name.clone())));
                defs.push(self.build_transition(
                    id,
                    EventMatcher::Named(event_name),
                    tc,
                    &mut order,
                )?);
            }

            for tc in pending.on_done {
                let event_name = format!("done.state.{}", self.nodes[id].name);
                defs.push(self.build_transition(
                    id,
                    EventMatcher::Named(event_name),
                    tc,
                    &mut order,
                )?);
            }

            for tc in pending.always {
                defs.push(self.build_transition(id, EventMatcher::Always, tc, &mut order)?);
            }

            self.pending[id].history_target = pending.history_target;
            out.push((id, defs));
        }

        for (id, entry_send, exit_cancel) in timer_actions {
            self.nodes[id].entry.push(entry_send);
            self.nodes[id].exit.push(exit_cancel);
        }

        Ok(out)
    }

    fn build_transition(
        &self,
        source: NodeId,
        event: EventMatcher,
        tc: TransitionConfig<C>,
        order: &mut usize,
    ) -> Result<TransitionDef<C>, DefinitionError> {
        let targets = tc
            .targets
            .iter()
            .map(|target| self.resolve_target(source, target))
            .collect::<Result<Vec<_>, _>>()?;

        if targets.len() > 1 {
            let dca = self.deepest_common_ancestor(&targets);
            if dca.is_none_or(|a| self.nodes[a].kind != NodeKind::Parallel) {
                return Err(DefinitionError::DivergentTargets {
                    from_state: self.nodes[source].name.clone(),
                });
            }
        }

        let mut cond = tc.cond;
        if let Some(guard) = cond.as_mut() {
            if guard.is_unresolved() {
                let name = guard.name().unwrap_or_default().to_string();
                let implementation = self
                    .guard_impls
                    .get(&name)
                    .ok_or(DefinitionError::UnknownGuard(name))?;
                guard.resolve_with(implementation.clone());
            }
        }

        let internal = tc.internal || targets.is_empty();
        let index = *order;
        *order += 1;

        Ok(TransitionDef {
            source,
            event,
            targets,
            cond,
            actions: self.resolve_custom_actions(tc.actions),
            internal,
            order: index,
        })
    }

    /// Target resolution: `#id` is absolute; otherwise the delimited
    /// path is tried against the source's siblings first, then against
    /// each ancestor's children walking upward.
    fn resolve_target(&self, source: NodeId, target: &str) -> Result<NodeId, DefinitionError> {
        if let Some(absolute) = target.strip_prefix('#') {
            return self
                .ids
                .get(absolute)
                .copied()
                .ok_or_else(|| self.unresolved(source, target));
        }

        let segments: Vec<&str> = target.split(self.delimiter).collect();
        let mut anchor = self.nodes[source].parent;
        if anchor.is_none() {
            anchor = Some(source);
        }
        while let Some(at) = anchor {
            if let Some(found) = self.descend(at, &segments) {
                return Ok(found);
            }
            anchor = self.nodes[at].parent;
        }
        Err(self.unresolved(source, target))
    }

    fn descend(&self, from: NodeId, segments: &[&str]) -> Option<NodeId> {
        let mut current = from;
        for segment in segments {
            current = self.child_by_key(current, segment)?;
        }
        Some(current)
    }

    fn child_by_key(&self, parent: NodeId, key: &str) -> Option<NodeId> {
        self.nodes[parent]
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes[child].key == key)
    }

    fn unresolved(&self, source: NodeId, target: &str) -> DefinitionError {
        DefinitionError::UnresolvedTarget {
            from_state: self.nodes[source].name.clone(),
            target: target.to_string(),
        }
    }

    /// Deepest node that is an ancestor-or-self of every given node.
    fn deepest_common_ancestor(&self, nodes: &[NodeId]) -> Option<NodeId> {
        let first = *nodes.first()?;
        let mut chain: Vec<NodeId> = self.ancestor_or_self_chain(first);
        for &other in &nodes[1..] {
            let other_chain = self.ancestor_or_self_chain(other);
            chain.retain(|id| other_chain.contains(id));
        }
        chain.first().copied()
    }

    /// Self first, root last.
    fn ancestor_or_self_chain(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = vec![node];
        let mut current = node;
        while let Some(parent) = self.nodes[current].parent {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    fn resolve_history_defaults(&self) -> Result<Vec<(NodeId, Vec<NodeId>)>, DefinitionError> {
        let mut out = Vec::new();
        for id in 0..self.nodes.len() {
            if self.nodes[id].kind != NodeKind::History {
                continue;
            }
            if let Some(target) = &self.pending[id].history_target {
                out.push((id, vec![self.resolve_target(id, target)?]));
            }
        }
        Ok(out)
    }
}
