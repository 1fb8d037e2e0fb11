//! Errors raised while loading a definition or computing a transition.

use crate::action::ActionError;
use thiserror::Error;

/// Structural violations caught while loading a definition. Fatal: the
/// machine is never constructed.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// Two nodes resolved to the same id.
    #[error("duplicate state id `{0}`")]
    DuplicateId(String),

    /// A state key contains the machine's delimiter.
    #[error("state key `{key}` contains the delimiter `{delimiter}`")]
    DelimiterInKey { key: String, delimiter: char },

    /// A compound state declares no initial child.
    #[error("state `{0}` has children but no initial child")]
    MissingInitial(String),

    /// The declared initial child does not exist.
    #[error("initial child `{initial}` of `{state}` does not exist")]
    UnknownInitial { state: String, initial: String },

    /// The declared initial child is a history node.
    #[error("initial child `{initial}` of `{state}` is a history state")]
    HistoryInitial { state: String, initial: String },

    /// A parallel state's child is not itself compound or parallel.
    #[error("child `{child}` of parallel state `{state}` must be compound or parallel")]
    InvalidRegion { state: String, child: String },

    /// The machine root or a parallel state declares no children.
    #[error("state `{0}` must declare child states")]
    NoChildStates(String),

    /// A final state declares children.
    #[error("final state `{0}` cannot have children")]
    FinalWithChildren(String),

    /// A final state declares outgoing transitions.
    #[error("final state `{0}` cannot have outgoing transitions")]
    FinalWithTransitions(String),

    /// A history state declares children.
    #[error("history state `{0}` cannot have children")]
    HistoryWithChildren(String),

    /// A transition target does not resolve to any node.
    #[error("cannot resolve target `{target}` from `{from_state}`")]
    UnresolvedTarget { from_state: String, target: String },

    /// A multi-target transition's targets do not share a parallel
    /// ancestor.
    #[error("targets of the transition from `{from_state}` must share a parallel ancestor")]
    DivergentTargets { from_state: String },

    /// A named guard has no implementation in the machine's options.
    #[error("unknown guard `{0}`")]
    UnknownGuard(String),

    /// Computing the initial configuration failed (an entry assignment
    /// reported an error).
    #[error("initial state could not be computed: {0}")]
    InitialState(String),
}

/// Transition-time failures. The prior configuration is preserved.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// The event is not a deliverable event (empty name).
    #[error("invalid event: `{0}`")]
    InvalidEvent(String),

    /// The given state value names states the definition does not have.
    #[error("state value `{0}` does not resolve in this machine")]
    InvalidValue(String),

    /// An assignment or resolver function reported an error; the
    /// macrostep is aborted.
    #[error("execution failed: {0}")]
    Execution(#[from] ActionError),

    /// Eventless transitions kept firing without reaching a stable
    /// configuration.
    #[error("eventless transitions failed to settle after {0} microsteps")]
    EventlessLoop(usize),
}
