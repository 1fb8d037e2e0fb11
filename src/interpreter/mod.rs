//! The cooperative interpreter.
//!
//! A [`Service`] owns one mutable configuration slot per machine
//! instance, serializes event delivery through an internal FIFO, runs
//! each macrostep to completion (draining raised events) before
//! notifying subscribers, and tracks delayed sends by id in a
//! cancellation table. A pluggable [`Clock`] drives timers; tests use
//! [`SimulatedClock`] for deterministic time.

mod clock;
mod error;

pub use clock::{Clock, SimulatedClock, SystemClock, TimerFn, TimerId};
pub use error::ServiceError;

use crate::action::{Action, Activity, ActivityHandle, ExecFn};
use crate::context::Context;
use crate::event::Event;
use crate::machine::{Machine, TransitionError};
use crate::state::State;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// A resolved log action, handed to the service's logger.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    /// Optional label from the log action.
    pub label: Option<String>,
    /// The resolved message.
    pub message: JsonValue,
}

/// Sink for [`LogEntry`] values.
pub type Logger = Arc<dyn Fn(&LogEntry) + Send + Sync>;

type Listener<C> = Arc<dyn Fn(&State<C>) + Send + Sync>;

/// Create a service for a machine, with the system clock and a
/// `tracing`-backed logger. Configure with [`Service::with_clock`] /
/// [`Service::with_logger`] before [`Service::start`].
pub fn interpret<C: Context>(machine: impl Into<Arc<Machine<C>>>) -> Service<C> {
    Service::assemble(machine.into(), Arc::new(SystemClock::new()), default_logger())
}

fn default_logger() -> Logger {
    Arc::new(|entry: &LogEntry| match &entry.label {
        Some(label) => debug!(target: "statecraft", label = %label, message = %entry.message),
        None => debug!(target: "statecraft", message = %entry.message),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    NotStarted,
    Running,
    Stopped,
}

struct QueuedEvent {
    /// Send id for cancellation; `None` for caller-sent events.
    send_id: Option<String>,
    event: Event,
}

struct Inner<C: Context> {
    status: Status,
    state: State<C>,
    queue: VecDeque<QueuedEvent>,
    /// Re-entrancy guard: sends arriving mid-drain only enqueue.
    processing: bool,
    listeners: HashMap<u64, Listener<C>>,
    next_listener: u64,
    /// Outstanding delayed sends, by send id.
    delayed: HashMap<String, TimerId>,
    /// Disposers of running activities, by activity name.
    running: HashMap<String, ActivityHandle>,
}

struct ServiceCore<C: Context> {
    machine: Arc<Machine<C>>,
    clock: Arc<dyn Clock>,
    logger: Logger,
    inner: Mutex<Inner<C>>,
}

/// Side effects collected under the lock and executed after it is
/// released, in order.
enum Effect<C: Context> {
    Log(LogEntry),
    Custom(ExecFn<C>, C, Event, String),
    Start(Activity, C),
    Stop(String),
    Notify(State<C>),
}

enum Seed {
    /// Process the current configuration's own actions (service start).
    InitialActions,
    Event(Event),
}

/// A running (or not yet started) machine instance.
///
/// Cloning the service clones a handle to the same instance.
pub struct Service<C: Context> {
    core: Arc<ServiceCore<C>>,
}

impl<C: Context> Clone for Service<C> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

/// Handle returned by [`Service::on_transition`]; dropping it keeps the
/// listener, [`Subscription::unsubscribe`] removes it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Remove the listener.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl<C: Context> Service<C> {
    fn assemble(machine: Arc<Machine<C>>, clock: Arc<dyn Clock>, logger: Logger) -> Self {
        let state = machine.initial_state().clone();
        Self {
            core: Arc::new(ServiceCore {
                machine,
                clock,
                logger,
                inner: Mutex::new(Inner {
                    status: Status::NotStarted,
                    state,
                    queue: VecDeque::new(),
                    processing: false,
                    listeners: HashMap::new(),
                    next_listener: 0,
                    delayed: HashMap::new(),
                    running: HashMap::new(),
                }),
            }),
        }
    }

    /// Replace the clock. Only meaningful before [`Service::start`].
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::assemble(
            Arc::clone(&self.core.machine),
            clock,
            Arc::clone(&self.core.logger),
        )
    }

    /// Replace the logger. Only meaningful before [`Service::start`].
    pub fn with_logger<F>(self, logger: F) -> Self
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        Self::assemble(
            Arc::clone(&self.core.machine),
            Arc::clone(&self.core.clock),
            Arc::new(logger),
        )
    }

    /// The definition this service runs.
    pub fn machine(&self) -> &Machine<C> {
        &self.core.machine
    }

    /// The current committed configuration.
    pub fn state(&self) -> State<C> {
        self.lock().state.clone()
    }

    /// True between [`Service::start`] and [`Service::stop`].
    pub fn is_running(&self) -> bool {
        self.lock().status == Status::Running
    }

    /// Enter the initial configuration and execute its actions
    /// (including delayed-send scheduling and activity starts).
    /// Idempotent while running.
    pub fn start(&self) -> Result<State<C>, ServiceError> {
        let outcome = {
            let mut inner = self.lock();
            match inner.status {
                Status::Running => return Ok(inner.state.clone()),
                Status::Stopped => return Err(ServiceError::Stopped),
                Status::NotStarted => {}
            }
            inner.status = Status::Running;
            inner.processing = true;
            let mut effects = Vec::new();
            let result = self.macrostep(&mut inner, Seed::InitialActions, &mut effects);
            if result.is_err() {
                inner.processing = false;
            }
            (effects, result)
        };
        self.run_effects(outcome.0);
        outcome.1?;
        self.drain()
    }

    /// Deliver an event. Errors before [`Service::start`]; a running
    /// service with no matching transition returns the unchanged
    /// configuration.
    pub fn send(&self, event: impl Into<Event>) -> Result<State<C>, ServiceError> {
        let event = event.into();
        {
            let mut inner = self.lock();
            match inner.status {
                Status::NotStarted => return Err(ServiceError::NotStarted),
                Status::Stopped => return Err(ServiceError::Stopped),
                Status::Running => {}
            }
            inner.queue.push_back(QueuedEvent {
                send_id: None,
                event,
            });
            if inner.processing {
                return Ok(inner.state.clone());
            }
            inner.processing = true;
        }
        self.drain()
    }

    /// Pure preview: compute the configuration `event` would produce,
    /// without committing it.
    pub fn next_state(&self, event: impl Into<Event>) -> Result<State<C>, TransitionError> {
        let current = self.lock().state.clone();
        self.core.machine.transition(&current, event)
    }

    /// Subscribe to committed configurations. The listener fires once
    /// per macrostep, after the configuration stabilized.
    pub fn on_transition<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&State<C>) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_listener;
            inner.next_listener += 1;
            inner.listeners.insert(id, Arc::new(listener));
            id
        };
        let weak = Arc::downgrade(&self.core);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    if let Ok(mut inner) = core.inner.lock() {
                        inner.listeners.remove(&id);
                    }
                }
            })),
        }
    }

    /// Force-stop the service: run the exit actions of every active
    /// node, stop running activities, and cancel outstanding delayed
    /// sends. The final configuration stays observable via
    /// [`Service::state`].
    pub fn stop(&self) -> Result<State<C>, ServiceError> {
        let effects = {
            let mut inner = self.lock();
            match inner.status {
                Status::NotStarted => return Err(ServiceError::NotStarted),
                Status::Stopped => return Ok(inner.state.clone()),
                Status::Running => {}
            }
            inner.status = Status::Stopped;
            inner.queue.clear();

            let mut effects = Vec::new();
            match self.core.machine.stop_actions(&inner.state) {
                Ok(actions) => {
                    for action in actions {
                        match action {
                            Action::Cancel { send_id } => {
                                if let Some(timer) = inner.delayed.remove(&send_id) {
                                    self.core.clock.clear_timeout(timer);
                                }
                            }
                            Action::Log(spec) => effects.push(Effect::Log(LogEntry {
                                label: spec.log_label().map(str::to_string),
                                message: spec
                                    .resolved_message()
                                    .cloned()
                                    .unwrap_or(JsonValue::Null),
                            })),
                            Action::Stop(activity) => {
                                effects.push(Effect::Stop(activity.name.clone()));
                            }
                            Action::Custom(spec) => {
                                if let Some(exec) = spec.exec() {
                                    effects.push(Effect::Custom(
                                        exec.clone(),
                                        inner.state.context.clone(),
                                        inner.state.event.clone(),
                                        spec.name().to_string(),
                                    ));
                                }
                            }
                            // Raising or sending from a stopping machine
                            // has no receiver.
                            _ => {}
                        }
                    }
                }
                Err(error) => warn!(%error, "could not compute exit actions on stop"),
            }

            for (_, timer) in inner.delayed.drain() {
                self.core.clock.clear_timeout(timer);
            }
            effects
        };
        self.run_effects(effects);

        let leftovers: Vec<ActivityHandle> = {
            let mut inner = self.lock();
            inner.running.drain().map(|(_, handle)| handle).collect()
        };
        for dispose in leftovers {
            dispose();
        }

        Ok(self.lock().state.clone())
    }

    // ---- event loop ---------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Inner<C>> {
        self.core.inner.lock().expect("service lock poisoned")
    }

    /// Process queued events until the FIFO is empty. `processing` must
    /// already be claimed by the caller.
    fn drain(&self) -> Result<State<C>, ServiceError> {
        loop {
            let (effects, result) = {
                let mut inner = self.lock();
                let Some(queued) = inner.queue.pop_front() else {
                    inner.processing = false;
                    return Ok(inner.state.clone());
                };
                let mut effects = Vec::new();
                let result = self.macrostep(&mut inner, Seed::Event(queued.event), &mut effects);
                if let Err(error) = &result {
                    inner.processing = false;
                    // Unhandled execution errors stop the service; a
                    // rejected event leaves it running.
                    if matches!(
                        error,
                        ServiceError::Transition(TransitionError::Execution(_))
                            | ServiceError::Transition(TransitionError::EventlessLoop(_))
                    ) {
                        inner.status = Status::Stopped;
                    }
                }
                (effects, result)
            };
            self.run_effects(effects);
            result?;
        }
    }

    /// One macrostep: run microsteps until no raised events remain,
    /// then queue a single notification.
    fn macrostep(
        &self,
        inner: &mut Inner<C>,
        seed: Seed,
        effects: &mut Vec<Effect<C>>,
    ) -> Result<(), ServiceError> {
        let mut internal: VecDeque<Event> = VecDeque::new();
        let mut pending: Vec<Action<C>> = match seed {
            Seed::InitialActions => inner.state.actions.clone(),
            Seed::Event(event) => {
                internal.push_back(event);
                Vec::new()
            }
        };

        loop {
            for action in &pending {
                self.process_action(inner, action, &mut internal, effects)?;
            }
            pending.clear();

            let Some(event) = internal.pop_front() else {
                break;
            };
            debug!(event = %event.name, "delivering event");

            let next = match self.core.machine.transition(&inner.state, event) {
                Ok(next) => next,
                Err(TransitionError::Execution(error)) => {
                    warn!(%error, "execution error; routing error.execution");
                    let error_event = Event::error_execution()
                        .with_payload(json!({ "message": error.message.clone() }));
                    let recovered = self
                        .core
                        .machine
                        .transition(&inner.state, error_event)
                        .map_err(ServiceError::from)?;
                    if recovered.changed {
                        recovered
                    } else {
                        return Err(TransitionError::Execution(error).into());
                    }
                }
                Err(other) => return Err(other.into()),
            };
            pending = next.actions.clone();
            inner.state = next;
        }

        effects.push(Effect::Notify(inner.state.clone()));
        Ok(())
    }

    fn process_action(
        &self,
        inner: &mut Inner<C>,
        action: &Action<C>,
        internal: &mut VecDeque<Event>,
        effects: &mut Vec<Effect<C>>,
    ) -> Result<(), ServiceError> {
        // Actions produced by `pure` factories may still carry
        // unresolved expressions; resolve against the committed step.
        let action = action
            .resolve(&inner.state.context, &inner.state.event)
            .map_err(TransitionError::Execution)?;

        match action {
            Action::Raise(event) => internal.push_back(event),
            Action::Send(spec) => {
                let Some(event) = spec.resolved_event() else {
                    return Ok(());
                };
                let id = spec
                    .send_id()
                    .map(str::to_string)
                    .unwrap_or_else(|| event.name.clone());
                match spec.delay_ms() {
                    Some(ms) if ms > 0 => {
                        let weak = Arc::downgrade(&self.core);
                        let send_id = id.clone();
                        let deferred = event.clone();
                        let timer = self.core.clock.set_timeout(
                            Box::new(move || {
                                if let Some(core) = weak.upgrade() {
                                    Service { core }.deliver_delayed(send_id, deferred);
                                }
                            }),
                            ms,
                        );
                        if let Some(stale) = inner.delayed.insert(id, timer) {
                            self.core.clock.clear_timeout(stale);
                        }
                    }
                    // Zero (or absent) delay still defers to the next
                    // macrostep.
                    _ => inner.queue.push_back(QueuedEvent {
                        send_id: Some(id),
                        event: event.clone(),
                    }),
                }
            }
            Action::Cancel { send_id } => {
                if let Some(timer) = inner.delayed.remove(&send_id) {
                    self.core.clock.clear_timeout(timer);
                }
                inner
                    .queue
                    .retain(|queued| queued.send_id.as_deref() != Some(send_id.as_str()));
            }
            Action::Log(spec) => effects.push(Effect::Log(LogEntry {
                label: spec.log_label().map(str::to_string),
                message: spec.resolved_message().cloned().unwrap_or(JsonValue::Null),
            })),
            Action::Start(activity) => {
                effects.push(Effect::Start(activity, inner.state.context.clone()));
            }
            Action::Stop(activity) => effects.push(Effect::Stop(activity.name)),
            // Assignments were folded into the context by the stepper.
            Action::Assign(_) => {}
            Action::Pure(factory) => {
                let produced = factory(&inner.state.context, &inner.state.event)
                    .map_err(TransitionError::Execution)?;
                for action in &produced {
                    self.process_action(inner, action, internal, effects)?;
                }
            }
            Action::Invoke(spec) => {
                debug!(id = %spec.id, src = %spec.src, "invoke requested; no child runtime attached");
            }
            Action::Custom(spec) => match spec.exec() {
                Some(exec) => effects.push(Effect::Custom(
                    exec.clone(),
                    inner.state.context.clone(),
                    inner.state.event.clone(),
                    spec.name().to_string(),
                )),
                None => debug!(action = %spec.name(), "action has no implementation; skipping"),
            },
        }
        Ok(())
    }

    fn deliver_delayed(&self, send_id: String, event: Event) {
        {
            let mut inner = self.lock();
            inner.delayed.remove(&send_id);
            if inner.status != Status::Running {
                return;
            }
            inner.queue.push_back(QueuedEvent {
                send_id: Some(send_id),
                event,
            });
            if inner.processing {
                return;
            }
            inner.processing = true;
        }
        if let Err(error) = self.drain() {
            warn!(%error, "delayed event processing failed");
        }
    }

    /// Execute collected effects outside the service lock, in order.
    fn run_effects(&self, effects: Vec<Effect<C>>) {
        for effect in effects {
            match effect {
                Effect::Log(entry) => (self.core.logger)(&entry),
                Effect::Custom(exec, context, event, name) => {
                    if let Err(error) = exec(&context, &event) {
                        warn!(action = %name, %error, "custom action failed; raising error.platform");
                        let machine_id = self.core.machine.id().to_string();
                        let mut inner = self.lock();
                        if inner.status == Status::Running {
                            inner.queue.push_back(QueuedEvent {
                                send_id: None,
                                event: Event::error_platform(&machine_id)
                                    .with_payload(json!({ "message": error.message })),
                            });
                        }
                    }
                }
                Effect::Start(activity, context) => {
                    let handle = self
                        .core
                        .machine
                        .activity_impl(&activity.name)
                        .and_then(|starter| starter(&context, &activity));
                    if let Some(handle) = handle {
                        self.lock().running.insert(activity.name.clone(), handle);
                    }
                }
                Effect::Stop(name) => {
                    let handle = self.lock().running.remove(&name);
                    if let Some(dispose) = handle {
                        dispose();
                    }
                }
                Effect::Notify(state) => {
                    let listeners: Vec<Listener<C>> =
                        self.lock().listeners.values().cloned().collect();
                    for listener in listeners {
                        listener(&state);
                    }
                }
            }
        }
    }
}
