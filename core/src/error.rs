//! Unified error types for the voice routing core.
//!
//! Component-local errors (`RelayError`, `ExecutionError`,
//! `OfflineHandlerError`) are defined next to their components; this module
//! defines the crate-level taxonomy that crosses component boundaries and the
//! mapping from terminal failures to user-visible messages.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the voice routing core.
#[derive(Debug, Error)]
pub enum TandemError {
    /// The intent source failed; the utterance routes to the offline
    /// fallback responder instead of erroring out.
    #[error("intent classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// The companion peer was not reachable when a relay was attempted.
    #[error("companion relay unreachable")]
    RelayUnreachable,

    /// The companion peer never acknowledged or never responded in time.
    #[error("companion relay timed out")]
    RelayTimeout,

    /// Remote credentials were rejected. Not retried automatically; retrying
    /// with stale credentials wastes the timeout budget.
    #[error("remote authentication failed: {0}")]
    RemoteAuthFailure(String),

    /// The remote service could not be reached.
    #[error("remote network failure: {0}")]
    RemoteNetworkFailure(String),

    /// The remote service answered with an error.
    #[error("remote service failure: {0}")]
    RemoteServerFailure(String),

    /// A strategy execution exceeded its per-strategy budget.
    #[error("execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    /// A response arrived for a superseded session. Dropped silently by the
    /// state machine; callers only see this when they submit stale input.
    #[error("stale response for superseded session {0}")]
    StaleSession(Uuid),

    /// Every eligible strategy was attempted and failed.
    #[error("no eligible strategy remains")]
    NoEligibleStrategy,

    /// Invalid or unparseable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A background worker could not be spawned or joined.
    #[error("worker error: {0}")]
    Worker(String),
}

/// Result type alias for core operations.
pub type TandemResult<T> = Result<T, TandemError>;

impl TandemError {
    /// Single human-readable message shown when a session ends in `Error`.
    ///
    /// Distinguishes "no connectivity" from "could not understand" from
    /// "service unavailable".
    pub fn user_message(&self) -> &'static str {
        match self {
            TandemError::RelayUnreachable
            | TandemError::RelayTimeout
            | TandemError::RemoteNetworkFailure(_) => {
                "I can't reach the network right now. Please try again later."
            }
            TandemError::ClassificationUnavailable(_)
            | TandemError::NoEligibleStrategy
            | TandemError::StaleSession(_) => "Sorry, I couldn't understand that.",
            TandemError::RemoteAuthFailure(_)
            | TandemError::RemoteServerFailure(_)
            | TandemError::ExecutionTimeout(_) => {
                "The service is unavailable right now. Please try again later."
            }
            TandemError::Config(_) | TandemError::Worker(_) => {
                "Something went wrong. Please try again."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_distinguish_failure_classes() {
        let connectivity = TandemError::RelayUnreachable.user_message();
        let understanding = TandemError::NoEligibleStrategy.user_message();
        let service = TandemError::RemoteAuthFailure("401".into()).user_message();

        assert_ne!(connectivity, understanding);
        assert_ne!(understanding, service);
        assert_ne!(connectivity, service);
    }

    #[test]
    fn test_network_failure_maps_to_connectivity_message() {
        let err = TandemError::RemoteNetworkFailure("connection refused".into());
        assert!(err.user_message().contains("network"));
    }
}
