//! Interpreter error types.

use crate::machine::TransitionError;
use thiserror::Error;

/// Errors surfaced by a [`crate::Service`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service has not been started yet.
    #[error("service has not been started; call start() before send()")]
    NotStarted,

    /// The service was stopped and no longer accepts events.
    #[error("service is stopped")]
    Stopped,

    /// The underlying transition failed; for execution errors the
    /// service already tried to route an `error.execution` event and
    /// found no handler.
    #[error(transparent)]
    Transition(#[from] TransitionError),
}
