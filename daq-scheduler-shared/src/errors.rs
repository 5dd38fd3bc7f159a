//! # Scheduler Error Kinds
//!
//! The six error kinds from the error-handling design: transport failures
//! that trigger reconnect, unresolvable state inconsistencies that are
//! fatal, local match-skip misses, malformed/unmatched protocol messages,
//! command fan-out timeouts, and workflow-repository failures. Only
//! `State` is fatal to the controller loop; everything else is recovered
//! locally or surfaced to a caller that knows how to interpret it.

use thiserror::Error;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Transport-level failure talking to the outer resource manager.
    /// Never propagated past the controller: triggers reconnect with backoff.
    #[error("resource manager transport error: {0}")]
    Transport(String),

    /// Unresolvable inconsistency (event for an unknown task in a state
    /// that forbids it, etc). Fatal: triggers controlled shutdown.
    #[error("unrecoverable scheduler state error: {0}")]
    State(String),

    /// A descriptor could not be satisfied by the current offer. Local and
    /// silent by design — logged at debug, never returned to a caller that
    /// would treat it as failure.
    #[error("descriptor could not be matched: {0}")]
    MatchSkip(String),

    /// Malformed message or a response that matched no pending command.
    /// Logged at warning and dropped.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A command fan-out did not collect all target responses before its
    /// deadline. Surfaced to the environment manager, which decides how to
    /// interpret a partial result.
    #[error("command {command_id} timed out waiting on {outstanding} target(s)")]
    CommandTimeout { command_id: String, outstanding: usize },

    /// Failure surfaced by the workflow template repository collaborator.
    /// Converted to an environment-level error; never crashes the scheduler.
    #[error("workflow repository error: {0}")]
    Repository(String),
}

impl SchedulerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SchedulerError::State(_))
    }
}
