//! Error types for the resolution engine.
//!
//! [`ResolveError`] is what a [`StateResolver`](crate::resolver::StateResolver)
//! reports; [`CoreError`] is what the orchestrator surfaces to its caller.
//! Non-fatal conditions (a predecessor whose state is not yet known, a
//! response nobody is waiting for) are logged, never returned.

use tardis_types::EventId;

/// Failures of a single state resolution call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The channel to the resolver is unavailable or failed mid-call.
    #[error("resolver transport error: {0}")]
    Transport(String),

    /// The resolver answered with an error instead of a result.
    #[error("resolver reported an error: {0}")]
    Remote(String),

    /// No answer arrived within the configured deadline.
    #[error("no response from resolver for {event_id} within {timeout_ms}ms")]
    Timeout {
        /// The event whose state was being resolved.
        event_id: EventId,
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The pending request was dropped without an answer (e.g. the
    /// resolver client shut down).
    #[error("resolve request abandoned before a response arrived")]
    Abandoned,

    /// The resolver sent something that could not be understood.
    #[error("resolver protocol error: {0}")]
    Protocol(String),
}

/// Errors returned by [`Orchestrator`](crate::orchestrator::Orchestrator)
/// and [`Session`](crate::session::Session).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The timeline references an event the store does not hold. This is an
    /// upstream invariant violation; the resolve call is aborted rather than
    /// computing state from a placeholder.
    #[error("event {0} is in the timeline but missing from the event store")]
    MissingEvent(EventId),

    /// Resolving the state after an event failed. The cache holds no entry
    /// for that event, so retrying is safe.
    #[error("failed to resolve state at {event_id}: {source}")]
    Resolve {
        /// The event whose state could not be resolved.
        event_id: EventId,
        /// Why the resolver call failed.
        #[source]
        source: ResolveError,
    },
}
