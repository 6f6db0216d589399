//! Strategy execution seams.
//!
//! The routing engine picks a strategy; this module defines what executes it.
//! Hosts plug in their remote service client and on-device model behind the
//! two traits here. Every execution is wrapped in a per-strategy budget via
//! [`run_with_timeout`], so a hung backend degrades into a fallback rather
//! than a stuck session.

use crate::error::TandemError;
use crate::intent::IntentLabel;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Failure classes for a single strategy execution.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Credentials rejected by the remote service. Terminal: no other
    /// strategy is attempted for this utterance.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// The backend could not be reached.
    #[error("network failure: {0}")]
    Network(String),

    /// The backend was reached but answered with an error.
    #[error("server failure: {0}")]
    Server(String),

    /// The on-device model failed to produce a result.
    #[error("model failure: {0}")]
    Model(String),

    /// The execution exceeded its budget. The underlying call may still be
    /// running; its eventual result is dropped.
    #[error("execution exceeded budget of {0:?}")]
    Timeout(Duration),
}

impl ExecutionError {
    /// Terminal errors stop the fallback chain for the current utterance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionError::Auth(_))
    }

    pub fn to_core_error(&self) -> TandemError {
        match self {
            ExecutionError::Auth(message) => TandemError::RemoteAuthFailure(message.clone()),
            ExecutionError::Network(message) => TandemError::RemoteNetworkFailure(message.clone()),
            ExecutionError::Server(message) | ExecutionError::Model(message) => {
                TandemError::RemoteServerFailure(message.clone())
            }
            ExecutionError::Timeout(budget) => TandemError::ExecutionTimeout(*budget),
        }
    }
}

/// Result of a successful strategy execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResponse {
    pub text: String,
    pub audio: Option<Vec<u8>>,
}

impl ExecutionResponse {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            audio: None,
        }
    }
}

/// Server-side execution backend.
pub trait RemoteExecutor: Send + Sync {
    fn execute(&self, label: IntentLabel, text: &str) -> Result<ExecutionResponse, ExecutionError>;
}

/// Local inference backend for the OnDevice strategy.
pub trait OnDeviceModel: Send + Sync {
    fn infer(&self, label: IntentLabel, text: &str) -> Result<ExecutionResponse, ExecutionError>;
}

/// Run `task` on a helper thread with a hard budget.
///
/// If the budget expires the caller moves on immediately; the helper thread
/// finishes in the background and its result is discarded.
pub fn run_with_timeout<F>(budget: Duration, task: F) -> Result<ExecutionResponse, ExecutionError>
where
    F: FnOnce() -> Result<ExecutionResponse, ExecutionError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("strategy-execution".to_string())
        .spawn(move || {
            let _ = tx.send(task());
        });
    if spawned.is_err() {
        return Err(ExecutionError::Model("failed to spawn execution thread".to_string()));
    }
    match rx.recv_timeout(budget) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ExecutionError::Timeout(budget)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(ExecutionError::Model("execution thread exited without a result".to_string()))
        }
    }
}
