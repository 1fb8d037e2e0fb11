//! Guard predicates for controlling transition selection.
//!
//! Guards are pure predicates evaluated against the context, the event,
//! and the current state value. A guard that fails (returns an error) is
//! treated as false: the engine logs a warning and selection continues
//! with the next candidate.

use crate::action::ActionError;
use crate::event::Event;
use crate::value::StateValue;
use std::fmt;
use std::sync::Arc;

/// Extra information available to a guard beyond context and event.
#[derive(Clone, Copy, Debug)]
pub struct GuardMeta<'a> {
    /// The state value the machine is in while selecting.
    pub state: &'a StateValue,
}

/// The stored predicate form.
pub type GuardFn<C> =
    Arc<dyn for<'a> Fn(&C, &Event, GuardMeta<'a>) -> Result<bool, ActionError> + Send + Sync>;

enum GuardKind<C> {
    Predicate(GuardFn<C>),
    /// Referenced by name; resolved against the machine's `guards`
    /// options at load.
    Named,
}

/// Pure predicate that determines whether a transition is enabled.
///
/// # Example
///
/// ```rust
/// use statecraft::{Event, Guard};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Ctx { fuel: u32 }
///
/// let has_fuel = Guard::new(|ctx: &Ctx, _event: &Event| ctx.fuel > 0);
/// ```
pub struct Guard<C> {
    name: Option<String>,
    kind: GuardKind<C>,
}

impl<C> Guard<C> {
    /// Create a guard from a predicate over context and event.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> bool + Send + Sync + 'static,
    {
        Self {
            name: None,
            kind: GuardKind::Predicate(Arc::new(move |ctx, event, _| Ok(predicate(ctx, event)))),
        }
    }

    /// Create a guard that also inspects the current state value.
    pub fn with_meta<F>(predicate: F) -> Self
    where
        F: for<'a> Fn(&C, &Event, GuardMeta<'a>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: None,
            kind: GuardKind::Predicate(Arc::new(move |ctx, event, meta| {
                Ok(predicate(ctx, event, meta))
            })),
        }
    }

    /// Create a fallible guard. An `Err` counts as guard-false with a
    /// logged warning.
    pub fn try_new<F>(predicate: F) -> Self
    where
        F: Fn(&C, &Event) -> Result<bool, ActionError> + Send + Sync + 'static,
    {
        Self {
            name: None,
            kind: GuardKind::Predicate(Arc::new(move |ctx, event, _| predicate(ctx, event))),
        }
    }

    /// Reference a guard by name, to be resolved against the machine's
    /// `guards` options at load.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            kind: GuardKind::Named,
        }
    }

    /// The guard's name, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn is_unresolved(&self) -> bool {
        matches!(self.kind, GuardKind::Named)
    }

    /// Replace an unresolved named guard with its implementation,
    /// keeping the name for diagnostics.
    pub(crate) fn resolve_with(&mut self, f: GuardFn<C>) {
        self.kind = GuardKind::Predicate(f);
    }

    /// Evaluate the guard. An unresolved named guard is a load-time bug
    /// and reports as an error here rather than panicking.
    pub(crate) fn evaluate(
        &self,
        context: &C,
        event: &Event,
        meta: GuardMeta<'_>,
    ) -> Result<bool, ActionError> {
        match &self.kind {
            GuardKind::Predicate(f) => f(context, event, meta),
            GuardKind::Named => Err(ActionError::new(format!(
                "guard `{}` was never resolved",
                self.name.as_deref().unwrap_or("<unnamed>")
            ))),
        }
    }
}

impl<C> Clone for Guard<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: match &self.kind {
                GuardKind::Predicate(f) => GuardKind::Predicate(Arc::clone(f)),
                GuardKind::Named => GuardKind::Named,
            },
        }
    }
}

impl<C> fmt::Debug for Guard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "Guard({name})"),
            None => f.write_str("Guard(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Ctx {
        ready: bool,
    }

    fn meta(value: &StateValue) -> GuardMeta<'_> {
        GuardMeta { state: value }
    }

    #[test]
    fn guard_evaluates_context() {
        let guard = Guard::new(|ctx: &Ctx, _| ctx.ready);
        let value = StateValue::from("idle");

        let enabled = guard
            .evaluate(&Ctx { ready: true }, &Event::from("GO"), meta(&value))
            .unwrap();
        assert!(enabled);

        let blocked = guard
            .evaluate(&Ctx { ready: false }, &Event::from("GO"), meta(&value))
            .unwrap();
        assert!(!blocked);
    }

    #[test]
    fn guard_with_meta_sees_state_value() {
        let guard =
            Guard::with_meta(|_: &Ctx, _, meta| StateValue::from("idle").matches(meta.state));
        let idle = StateValue::from("idle");
        let busy = StateValue::from("busy");

        let ctx = Ctx { ready: true };
        assert!(guard.evaluate(&ctx, &Event::from("GO"), meta(&idle)).unwrap());
        assert!(!guard.evaluate(&ctx, &Event::from("GO"), meta(&busy)).unwrap());
    }

    #[test]
    fn fallible_guard_reports_errors() {
        let guard = Guard::try_new(|_: &Ctx, _| Err(ActionError::new("boom")));
        let value = StateValue::from("idle");

        let result = guard.evaluate(&Ctx { ready: true }, &Event::from("GO"), meta(&value));
        assert!(result.is_err());
    }

    #[test]
    fn named_guard_is_unresolved_until_load() {
        let guard: Guard<Ctx> = Guard::named("isReady");
        assert!(guard.is_unresolved());
        assert_eq!(guard.name(), Some("isReady"));

        let value = StateValue::from("idle");
        let result = guard.evaluate(&Ctx { ready: true }, &Event::from("GO"), meta(&value));
        assert!(result.is_err());
    }

    #[test]
    fn guard_is_deterministic() {
        let guard = Guard::new(|ctx: &Ctx, _| ctx.ready);
        let value = StateValue::from("idle");
        let ctx = Ctx { ready: true };
        let event = Event::from("GO");

        let first = guard.evaluate(&ctx, &event, meta(&value)).unwrap();
        let second = guard.evaluate(&ctx, &event, meta(&value)).unwrap();
        assert_eq!(first, second);
    }
}
