//! The action universe: a tagged sum of everything a transition can emit.
//!
//! The engine only *constructs* these records; executing them is the
//! interpreter's job. Builders mirror the declarative forms: [`raise`],
//! [`send`], [`cancel`], [`log`], [`assign`], [`pure`], [`invoke`], plus
//! implicit activity [`Action::Start`]/[`Action::Stop`] records the
//! stepper emits on entry and exit.

use crate::event::Event;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a user-supplied callback (guard, assignment,
/// expression, custom action). Surfaces as an execution error and aborts
/// the macrostep.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError {
    /// Human-readable description of what went wrong.
    pub message: String,
}

impl ActionError {
    /// Create an error from any printable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Assignment: produces the next whole context from the running
/// accumulator and the event.
pub type AssignFn<C> = Arc<dyn Fn(&C, &Event) -> Result<C, ActionError> + Send + Sync>;

/// Deferred event expression for dynamic `send`.
pub type EventExprFn<C> = Arc<dyn Fn(&C, &Event) -> Result<Event, ActionError> + Send + Sync>;

/// Deferred message expression for dynamic `log`.
pub type LogExprFn<C> = Arc<dyn Fn(&C, &Event) -> Result<JsonValue, ActionError> + Send + Sync>;

/// Factory evaluated by the interpreter against the step's final context;
/// yields zero or more follow-up actions.
pub type PureFn<C> = Arc<dyn Fn(&C, &Event) -> Result<Vec<Action<C>>, ActionError> + Send + Sync>;

/// Side-effecting body of a custom action, run by the interpreter.
pub type ExecFn<C> = Arc<dyn Fn(&C, &Event) -> Result<(), ActionError> + Send + Sync>;

/// Discriminant of an [`Action`], for classification and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Raise,
    Send,
    Cancel,
    Log,
    Start,
    Stop,
    Assign,
    Pure,
    Invoke,
    Custom,
}

/// A long-running side effect owned by a state node; started on entry,
/// stopped on exit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activity {
    /// The activity's name, resolved against the machine's activity
    /// implementations.
    pub name: String,
    /// Full id of the node the activity belongs to.
    pub owner: String,
}

/// Disposer returned by an activity starter; the interpreter runs it
/// when the activity stops.
pub type ActivityHandle = Box<dyn FnOnce() + Send>;

/// Activity starter, invoked by the interpreter on entry.
pub type ActivityFn<C> = Arc<dyn Fn(&C, &Activity) -> Option<ActivityHandle> + Send + Sync>;

/// An event to send, either fully resolved or awaiting evaluation
/// against the step's final context.
pub(crate) enum SendEvent<C> {
    Literal(Event),
    Expr(EventExprFn<C>),
}

impl<C> Clone for SendEvent<C> {
    fn clone(&self) -> Self {
        match self {
            SendEvent::Literal(event) => SendEvent::Literal(event.clone()),
            SendEvent::Expr(f) => SendEvent::Expr(Arc::clone(f)),
        }
    }
}

/// A deferred event delivery. Delay is in milliseconds; an absent delay
/// still defers to the next macrostep.
pub struct SendSpec<C> {
    pub(crate) event: SendEvent<C>,
    pub(crate) delay: Option<u64>,
    pub(crate) id: Option<String>,
}

impl<C> SendSpec<C> {
    /// Defer delivery by `ms` milliseconds.
    pub fn delay(mut self, ms: u64) -> Self {
        self.delay = Some(ms);
        self
    }

    /// Set an explicit send id for later [`cancel`].
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The event, once resolved.
    pub fn resolved_event(&self) -> Option<&Event> {
        match &self.event {
            SendEvent::Literal(event) => Some(event),
            SendEvent::Expr(_) => None,
        }
    }

    /// The configured delay in milliseconds.
    pub fn delay_ms(&self) -> Option<u64> {
        self.delay
    }

    /// The send id. Defaults to the event name at resolution time, so
    /// ids are stable across transitions.
    pub fn send_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl<C> Clone for SendSpec<C> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            delay: self.delay,
            id: self.id.clone(),
        }
    }
}

pub(crate) enum LogMessage<C> {
    Literal(JsonValue),
    Expr(LogExprFn<C>),
}

impl<C> Clone for LogMessage<C> {
    fn clone(&self) -> Self {
        match self {
            LogMessage::Literal(value) => LogMessage::Literal(value.clone()),
            LogMessage::Expr(f) => LogMessage::Expr(Arc::clone(f)),
        }
    }
}

/// A log entry to emit through the interpreter's logger.
pub struct LogSpec<C> {
    pub(crate) label: Option<String>,
    pub(crate) message: LogMessage<C>,
}

impl<C> LogSpec<C> {
    /// Attach a label shown alongside the message.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The label, if any.
    pub fn log_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The message, once resolved.
    pub fn resolved_message(&self) -> Option<&JsonValue> {
        match &self.message {
            LogMessage::Literal(value) => Some(value),
            LogMessage::Expr(_) => None,
        }
    }
}

impl<C> Clone for LogSpec<C> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            message: self.message.clone(),
        }
    }
}

/// Hook record for invoking an external child machine. The engine only
/// carries the record; spawning is the interpreter's concern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvokeSpec {
    /// Id the child reports back through `done.invoke.<id>` /
    /// `error.platform.<id>`.
    pub id: String,
    /// Source name of the child definition.
    pub src: String,
}

/// A user-named action, resolved against the machine's action
/// implementations at load.
pub struct CustomSpec<C> {
    pub(crate) name: String,
    pub(crate) exec: Option<ExecFn<C>>,
}

impl<C> CustomSpec<C> {
    /// The action's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The resolved body, if the name was known at load.
    pub(crate) fn exec(&self) -> Option<&ExecFn<C>> {
        self.exec.as_ref()
    }
}

impl<C> Clone for CustomSpec<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            exec: self.exec.as_ref().map(Arc::clone),
        }
    }
}

/// An emitted action. Dispatch is an exhaustive match on the variant.
pub enum Action<C> {
    /// Queue an internal event, consumed before any external send in the
    /// same macrostep.
    Raise(Event),
    /// Deferred (possibly delayed) event delivery.
    Send(SendSpec<C>),
    /// Nullify a not-yet-delivered send with the matching id.
    Cancel {
        /// Id of the send to cancel.
        send_id: String,
    },
    /// Emit a message through the interpreter's logger.
    Log(LogSpec<C>),
    /// Implicit activity start for an entered node.
    Start(Activity),
    /// Implicit activity stop for an exited node.
    Stop(Activity),
    /// Context update, folded into the step's context and stripped from
    /// the visible action list.
    Assign(AssignFn<C>),
    /// Factory producing follow-up actions when the interpreter asks.
    Pure(PureFn<C>),
    /// External child machine hook.
    Invoke(InvokeSpec),
    /// User-named action resolved through the machine's options.
    Custom(CustomSpec<C>),
}

impl<C> Action<C> {
    /// A named action, to be resolved against the machine's
    /// `actions` options at load.
    pub fn named(name: impl Into<String>) -> Self {
        Action::Custom(CustomSpec {
            name: name.into(),
            exec: None,
        })
    }

    /// This action's kind tag.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Raise(_) => ActionKind::Raise,
            Action::Send(_) => ActionKind::Send,
            Action::Cancel { .. } => ActionKind::Cancel,
            Action::Log(_) => ActionKind::Log,
            Action::Start(_) => ActionKind::Start,
            Action::Stop(_) => ActionKind::Stop,
            Action::Assign(_) => ActionKind::Assign,
            Action::Pure(_) => ActionKind::Pure,
            Action::Invoke(_) => ActionKind::Invoke,
            Action::Custom(_) => ActionKind::Custom,
        }
    }

    /// Resolve dynamic fields (send/log expressions) against the step's
    /// final context, and fill in defaulted send ids.
    pub(crate) fn resolve(&self, context: &C, event: &Event) -> Result<Action<C>, ActionError> {
        match self {
            Action::Send(spec) => {
                let resolved = match &spec.event {
                    SendEvent::Literal(e) => e.clone(),
                    SendEvent::Expr(f) => f(context, event)?,
                };
                let id = spec.id.clone().unwrap_or_else(|| resolved.name.clone());
                Ok(Action::Send(SendSpec {
                    event: SendEvent::Literal(resolved),
                    delay: spec.delay,
                    id: Some(id),
                }))
            }
            Action::Log(spec) => {
                let resolved = match &spec.message {
                    LogMessage::Literal(value) => value.clone(),
                    LogMessage::Expr(f) => f(context, event)?,
                };
                Ok(Action::Log(LogSpec {
                    label: spec.label.clone(),
                    message: LogMessage::Literal(resolved),
                }))
            }
            other => Ok(other.clone()),
        }
    }
}

impl<C> Clone for Action<C> {
    fn clone(&self) -> Self {
        match self {
            Action::Raise(event) => Action::Raise(event.clone()),
            Action::Send(spec) => Action::Send(spec.clone()),
            Action::Cancel { send_id } => Action::Cancel {
                send_id: send_id.clone(),
            },
            Action::Log(spec) => Action::Log(spec.clone()),
            Action::Start(activity) => Action::Start(activity.clone()),
            Action::Stop(activity) => Action::Stop(activity.clone()),
            Action::Assign(f) => Action::Assign(Arc::clone(f)),
            Action::Pure(f) => Action::Pure(Arc::clone(f)),
            Action::Invoke(spec) => Action::Invoke(spec.clone()),
            Action::Custom(spec) => Action::Custom(spec.clone()),
        }
    }
}

impl<C> fmt::Debug for Action<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Raise(event) => f.debug_tuple("Raise").field(&event.name).finish(),
            Action::Send(spec) => f
                .debug_struct("Send")
                .field("event", &spec.resolved_event().map(|e| e.name.as_str()))
                .field("delay", &spec.delay)
                .field("id", &spec.id)
                .finish(),
            Action::Cancel { send_id } => f.debug_tuple("Cancel").field(send_id).finish(),
            Action::Log(spec) => f
                .debug_struct("Log")
                .field("label", &spec.label)
                .field("message", &spec.resolved_message())
                .finish(),
            Action::Start(activity) => f.debug_tuple("Start").field(&activity.name).finish(),
            Action::Stop(activity) => f.debug_tuple("Stop").field(&activity.name).finish(),
            Action::Assign(_) => f.write_str("Assign(..)"),
            Action::Pure(_) => f.write_str("Pure(..)"),
            Action::Invoke(spec) => f.debug_tuple("Invoke").field(&spec.id).finish(),
            Action::Custom(spec) => f.debug_tuple("Custom").field(&spec.name).finish(),
        }
    }
}

impl<C> From<&str> for Action<C> {
    fn from(name: &str) -> Self {
        Action::named(name)
    }
}

impl<C> From<SendSpec<C>> for Action<C> {
    fn from(spec: SendSpec<C>) -> Self {
        Action::Send(spec)
    }
}

impl<C> From<LogSpec<C>> for Action<C> {
    fn from(spec: LogSpec<C>) -> Self {
        Action::Log(spec)
    }
}

/// Queue an internal event.
pub fn raise<C>(event: impl Into<Event>) -> Action<C> {
    Action::Raise(event.into())
}

/// Send an event back to the machine, optionally delayed via
/// [`SendSpec::delay`] and cancellable via [`SendSpec::id`].
pub fn send<C>(event: impl Into<Event>) -> SendSpec<C> {
    SendSpec {
        event: SendEvent::Literal(event.into()),
        delay: None,
        id: None,
    }
}

/// Send an event computed from the step's final context.
pub fn send_expr<C, F>(f: F) -> SendSpec<C>
where
    F: Fn(&C, &Event) -> Event + Send + Sync + 'static,
{
    SendSpec {
        event: SendEvent::Expr(Arc::new(move |ctx, ev| Ok(f(ctx, ev)))),
        delay: None,
        id: None,
    }
}

/// Cancel a pending send by id.
pub fn cancel<C>(send_id: impl Into<String>) -> Action<C> {
    Action::Cancel {
        send_id: send_id.into(),
    }
}

/// Log a message computed from the step's final context.
pub fn log<C, F>(f: F) -> LogSpec<C>
where
    F: Fn(&C, &Event) -> JsonValue + Send + Sync + 'static,
{
    LogSpec {
        label: None,
        message: LogMessage::Expr(Arc::new(move |ctx, ev| Ok(f(ctx, ev)))),
    }
}

/// Log a fixed message.
pub fn log_message<C>(message: impl Into<JsonValue>) -> LogSpec<C> {
    LogSpec {
        label: None,
        message: LogMessage::Literal(message.into()),
    }
}

/// Update the context. The function receives the running accumulator and
/// returns the next whole context.
pub fn assign<C, F>(f: F) -> Action<C>
where
    F: Fn(&C, &Event) -> C + Send + Sync + 'static,
{
    Action::Assign(Arc::new(move |ctx, ev| Ok(f(ctx, ev))))
}

/// Fallible assignment; an `Err` aborts the macrostep as an execution
/// error.
pub fn try_assign<C, F>(f: F) -> Action<C>
where
    F: Fn(&C, &Event) -> Result<C, ActionError> + Send + Sync + 'static,
{
    Action::Assign(Arc::new(f))
}

/// Produce follow-up actions when the interpreter asks, evaluated
/// against the step's final context. Assignments inside the result are
/// not folded; emit data-only actions.
pub fn pure<C, F>(f: F) -> Action<C>
where
    F: Fn(&C, &Event) -> Vec<Action<C>> + Send + Sync + 'static,
{
    Action::Pure(Arc::new(move |ctx, ev| Ok(f(ctx, ev))))
}

/// Record an external child machine invocation.
pub fn invoke<C>(id: impl Into<String>, src: impl Into<String>) -> Action<C> {
    Action::Invoke(InvokeSpec {
        id: id.into(),
        src: src.into(),
    })
}

/// An inline custom action with an explicit body.
pub fn exec<C, F>(name: impl Into<String>, f: F) -> Action<C>
where
    F: Fn(&C, &Event) -> Result<(), ActionError> + Send + Sync + 'static,
{
    Action::Custom(CustomSpec {
        name: name.into(),
        exec: Some(Arc::new(f)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq)]
    struct Counter {
        count: i64,
    }

    #[test]
    fn kinds_are_reported() {
        let raised: Action<()> = raise("X");
        assert_eq!(raised.kind(), ActionKind::Raise);
        let sent: Action<()> = send("X").into();
        assert_eq!(sent.kind(), ActionKind::Send);
        let cancelled: Action<()> = cancel("id");
        assert_eq!(cancelled.kind(), ActionKind::Cancel);
        assert_eq!(assign::<(), _>(|_, _| ()).kind(), ActionKind::Assign);
        assert_eq!(Action::<()>::named("beep").kind(), ActionKind::Custom);
    }

    #[test]
    fn send_resolution_defaults_id_to_event_name() {
        let action: Action<()> = send("TIMER").delay(10).into();
        let resolved = action.resolve(&(), &Event::init()).unwrap();
        match resolved {
            Action::Send(spec) => {
                assert_eq!(spec.resolved_event().unwrap().name, "TIMER");
                assert_eq!(spec.send_id(), Some("TIMER"));
                assert_eq!(spec.delay_ms(), Some(10));
            }
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn send_expr_resolves_against_context() {
        let action: Action<Counter> =
            send_expr(|ctx: &Counter, _| Event::new(format!("COUNT_{}", ctx.count))).into();
        let resolved = action
            .resolve(&Counter { count: 2 }, &Event::init())
            .unwrap();
        match resolved {
            Action::Send(spec) => assert_eq!(spec.resolved_event().unwrap().name, "COUNT_2"),
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn log_expr_resolves_against_context() {
        let action: Action<Counter> = log(|ctx: &Counter, _| json!({"count": ctx.count})).into();
        let resolved = action
            .resolve(&Counter { count: 7 }, &Event::init())
            .unwrap();
        match resolved {
            Action::Log(spec) => {
                assert_eq!(spec.resolved_message().unwrap(), &json!({"count": 7}));
            }
            other => panic!("expected Log, got {other:?}"),
        }
    }

    #[test]
    fn explicit_send_id_survives_resolution() {
        let action: Action<()> = send("TIMER").id("keepalive").into();
        let resolved = action.resolve(&(), &Event::init()).unwrap();
        match resolved {
            Action::Send(spec) => assert_eq!(spec.send_id(), Some("keepalive")),
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn named_actions_start_unresolved() {
        match Action::<()>::named("beep") {
            Action::Custom(spec) => {
                assert_eq!(spec.name(), "beep");
                assert!(spec.exec().is_none());
            }
            other => panic!("expected Custom, got {other:?}"),
        }
    }
}
