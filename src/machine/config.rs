//! Declarative machine configuration with fluent builders.
//!
//! A [`crate::Machine`] is built from a tree of [`StateConfig`] nodes.
//! Shorthands mirror the declarative forms: an event mapped to a bare
//! string is an external transition to that target, a single action is a
//! one-element list, `after` timers and `on_done` handlers normalize
//! into plain transitions at load.

use crate::action::{Action, ActivityFn, ActivityHandle, ExecFn};
use crate::context::Context;
use crate::event::Event;
use crate::guard::{Guard, GuardFn};
use crate::machine::error::DefinitionError;
use crate::machine::Machine;
use crate::value::DEFAULT_DELIMITER;
use std::collections::HashMap;
use std::sync::Arc;

/// Whether a history node remembers immediate children or whole
/// subtrees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryKind {
    /// Remember the immediate child; re-enter it through its initial
    /// states.
    Shallow,
    /// Remember the full subtree down to the leaves.
    Deep,
}

/// Kind hint carried by a [`StateConfig`] before normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ConfigKind {
    /// Atomic or compound, decided by the presence of children.
    Normal,
    Parallel,
    Final,
    History(HistoryKind),
}

/// One transition in a declarative configuration.
///
/// `From<&str>` provides the `EVENT: "target"` shorthand: a bare string
/// is an external transition to that target.
pub struct TransitionConfig<C> {
    pub(crate) targets: Vec<String>,
    pub(crate) cond: Option<Guard<C>>,
    pub(crate) actions: Vec<Action<C>>,
    pub(crate) internal: bool,
}

impl<C> TransitionConfig<C> {
    /// A targetless transition: internal by definition, only its
    /// actions fire.
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            cond: None,
            actions: Vec::new(),
            internal: false,
        }
    }

    /// An external transition to a single target.
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            targets: vec![target.into()],
            cond: None,
            actions: Vec::new(),
            internal: false,
        }
    }

    /// An external transition to several targets; the targets must share
    /// a parallel ancestor.
    pub fn to_all<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            cond: None,
            actions: Vec::new(),
            internal: false,
        }
    }

    /// Guard the transition.
    pub fn cond(mut self, guard: Guard<C>) -> Self {
        self.cond = Some(guard);
        self
    }

    /// Guard the transition with a closure.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> bool + Send + Sync + 'static,
    {
        self.cond(Guard::new(predicate))
    }

    /// Append an action.
    pub fn action(mut self, action: impl Into<Action<C>>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Mark the transition internal: its source is not exited even
    /// though a target is present.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

impl<C> Default for TransitionConfig<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> From<&str> for TransitionConfig<C> {
    fn from(target: &str) -> Self {
        TransitionConfig::to(target)
    }
}

impl<C> From<String> for TransitionConfig<C> {
    fn from(target: String) -> Self {
        TransitionConfig::to(target)
    }
}

/// Declarative description of one state node.
pub struct StateConfig<C> {
    pub(crate) kind: ConfigKind,
    pub(crate) id: Option<String>,
    pub(crate) initial: Option<String>,
    pub(crate) states: Vec<(String, StateConfig<C>)>,
    pub(crate) on: Vec<(String, TransitionConfig<C>)>,
    pub(crate) always: Vec<TransitionConfig<C>>,
    pub(crate) entry: Vec<Action<C>>,
    pub(crate) exit: Vec<Action<C>>,
    pub(crate) activities: Vec<String>,
    pub(crate) after: Vec<(u64, TransitionConfig<C>)>,
    pub(crate) on_done: Vec<TransitionConfig<C>>,
    pub(crate) history_target: Option<String>,
}

impl<C> StateConfig<C> {
    fn with_kind(kind: ConfigKind) -> Self {
        Self {
            kind,
            id: None,
            initial: None,
            states: Vec::new(),
            on: Vec::new(),
            always: Vec::new(),
            entry: Vec::new(),
            exit: Vec::new(),
            activities: Vec::new(),
            after: Vec::new(),
            on_done: Vec::new(),
            history_target: None,
        }
    }

    /// An atomic state, or a compound one once children are added.
    pub fn new() -> Self {
        Self::with_kind(ConfigKind::Normal)
    }

    /// A parallel state: every child region is active simultaneously.
    pub fn parallel() -> Self {
        Self::with_kind(ConfigKind::Parallel)
    }

    /// A final state.
    pub fn final_state() -> Self {
        Self::with_kind(ConfigKind::Final)
    }

    /// A history pseudo-state. Transition targets naming it resolve to
    /// the parent's remembered value.
    pub fn history(kind: HistoryKind) -> Self {
        Self::with_kind(ConfigKind::History(kind))
    }

    /// Give the node an explicit id, addressable as `#id` in targets.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Declare the initial child of a compound state.
    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.initial = Some(key.into());
        self
    }

    /// Add a child state. Insertion order is document order and drives
    /// every tie-break.
    pub fn state(mut self, key: impl Into<String>, config: StateConfig<C>) -> Self {
        self.states.push((key.into(), config));
        self
    }

    /// Add a transition for an event (`"*"` is the wildcard). Repeated
    /// calls for the same event append candidates in document order.
    pub fn on(mut self, event: impl Into<String>, transition: impl Into<TransitionConfig<C>>) -> Self {
        self.on.push((event.into(), transition.into()));
        self
    }

    /// Add an eventless transition, evaluated after every microstep.
    pub fn always(mut self, transition: impl Into<TransitionConfig<C>>) -> Self {
        self.always.push(transition.into());
        self
    }

    /// Append an entry action.
    pub fn entry(mut self, action: impl Into<Action<C>>) -> Self {
        self.entry.push(action.into());
        self
    }

    /// Append an exit action.
    pub fn exit(mut self, action: impl Into<Action<C>>) -> Self {
        self.exit.push(action.into());
        self
    }

    /// Attach an activity by name; started on entry, stopped on exit.
    pub fn activity(mut self, name: impl Into<String>) -> Self {
        self.activities.push(name.into());
        self
    }

    /// Schedule a transition after `ms` milliseconds in this state.
    /// Normalizes to an entry-time delayed send plus a transition on the
    /// generated delay event; exiting the state cancels the timer.
    pub fn after(mut self, ms: u64, transition: impl Into<TransitionConfig<C>>) -> Self {
        self.after.push((ms, transition.into()));
        self
    }

    /// Transition taken when every region of this state reaches a final
    /// state (the synthetic `done.state.<id>` event).
    pub fn on_done(mut self, transition: impl Into<TransitionConfig<C>>) -> Self {
        self.on_done.push(transition.into());
        self
    }

    /// Default target of a history node, used when nothing was
    /// remembered yet.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.history_target = Some(target.into());
        self
    }
}

impl<C> Default for StateConfig<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for a whole machine: the root [`StateConfig`] plus
/// options (guard/action/activity implementations, delimiter, context).
pub struct MachineBuilder<C> {
    pub(crate) id: String,
    pub(crate) root: StateConfig<C>,
    pub(crate) context: Option<C>,
    pub(crate) delimiter: char,
    pub(crate) guards: HashMap<String, GuardFn<C>>,
    pub(crate) actions: HashMap<String, ExecFn<C>>,
    pub(crate) activities: HashMap<String, ActivityFn<C>>,
}

impl<C: Context> MachineBuilder<C> {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            root: StateConfig::new(),
            context: None,
            delimiter: DEFAULT_DELIMITER,
            guards: HashMap::new(),
            actions: HashMap::new(),
            activities: HashMap::new(),
        }
    }

    /// Declare the machine's initial top-level state.
    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.root = self.root.initial(key);
        self
    }

    /// Add a top-level state.
    pub fn state(mut self, key: impl Into<String>, config: StateConfig<C>) -> Self {
        self.root = self.root.state(key, config);
        self
    }

    /// Make the machine root parallel: every top-level state is a
    /// region.
    pub fn parallel(mut self) -> Self {
        self.root.kind = ConfigKind::Parallel;
        self
    }

    /// Add a machine-level transition, consulted when no active state
    /// handles the event.
    pub fn on(mut self, event: impl Into<String>, transition: impl Into<TransitionConfig<C>>) -> Self {
        self.root = self.root.on(event, transition);
        self
    }

    /// Set the initial context. Without this the context defaults to
    /// `C::default()` at build.
    pub fn context(mut self, context: C) -> Self {
        self.context = Some(context);
        self
    }

    /// Override the id delimiter (default `.`).
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Register a guard implementation for [`Guard::named`] references.
    pub fn guard<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> bool + Send + Sync + 'static,
    {
        self.guards.insert(
            name.into(),
            Arc::new(move |ctx, event, _| Ok(predicate(ctx, event))),
        );
        self
    }

    /// Register an action implementation for named actions.
    pub fn action<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&C, &Event) + Send + Sync + 'static,
    {
        self.actions.insert(
            name.into(),
            Arc::new(move |ctx, event| {
                f(ctx, event);
                Ok(())
            }),
        );
        self
    }

    /// Register an activity implementation. The starter may return a
    /// disposer run when the activity stops.
    pub fn activity<F>(mut self, name: impl Into<String>, starter: F) -> Self
    where
        F: Fn(&C, &crate::action::Activity) -> Option<ActivityHandle> + Send + Sync + 'static,
    {
        self.activities.insert(name.into(), Arc::new(starter));
        self
    }

    /// Normalize, validate, and load the definition.
    pub fn build(self) -> Result<Machine<C>, DefinitionError>
    where
        C: Default,
    {
        crate::machine::load::load(self)
    }
}
