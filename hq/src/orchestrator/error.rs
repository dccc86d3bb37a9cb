//! Orchestrator error types

use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned by [`Orchestrator`](super::Orchestrator) runs
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A device the sequence needs is not configured; nothing was sent
    #[error("Can not perform action: {0}")]
    Configuration(String),

    /// Another sequence is in flight; nothing was sent
    #[error("A sequence is already running")]
    AlreadyRunning,

    /// A step failed and the remaining steps were skipped
    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: TransportError,
    },
}

impl OrchestratorError {
    /// Name of the failed step, if a step was attempted
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            OrchestratorError::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}
