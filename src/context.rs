//! The machine's extended state and the assignment fold over it.
//!
//! The engine never inspects the context; it only threads it through
//! guards, assignments, and expression resolution. Assignments fold
//! left-to-right, each seeing the running accumulator.

use crate::action::{Action, ActionError, AssignFn};
use crate::event::Event;
use std::fmt::Debug;

/// Blanket bound for context types: any clonable, comparable value.
pub trait Context: Clone + PartialEq + Debug + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Debug + Send + Sync + 'static> Context for T {}

/// Fold a sequence of assignment functions into the context,
/// left-to-right. Each assignment sees the accumulator produced by the
/// previous one. An `Err` aborts the fold (and, upstream, the
/// macrostep).
pub fn update_context<C: Context>(
    context: &C,
    event: &Event,
    assigns: &[AssignFn<C>],
) -> Result<C, ActionError> {
    let mut acc = context.clone();
    for assign in assigns {
        acc = assign(&acc, event)?;
    }
    Ok(acc)
}

/// Pull the assignment functions out of an action list, in order.
pub(crate) fn collect_assigns<C>(actions: &[Action<C>]) -> Vec<AssignFn<C>> {
    actions
        .iter()
        .filter_map(|action| match action {
            Action::Assign(f) => Some(f.clone()),
            _ => None,
        })
        .collect()
}
