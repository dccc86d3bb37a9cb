//! Sequence steps and the orchestrator state machine

use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;

use crate::transport::TransportError;

/// Future produced by one step
pub type StepFuture = BoxFuture<'static, Result<(), TransportError>>;

/// One named remote action, invoked at most once
pub struct SequenceStep {
    name: String,
    invoke: Box<dyn FnOnce() -> StepFuture + Send>,
}

impl SequenceStep {
    pub fn new<F, Fut>(name: impl Into<String>, invoke: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            invoke: Box::new(move || invoke().boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the step, consuming it
    pub(super) fn start(self) -> (String, StepFuture) {
        let future = (self.invoke)();
        (self.name, future)
    }
}

impl fmt::Debug for SequenceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceStep").field("name", &self.name).finish()
    }
}

/// Orchestrator lifecycle: `Idle -> Running -> {Succeeded, Failed}`
///
/// A terminal state is left again by the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum OrchestratorState {
    Idle,
    Running { step: String },
    Succeeded,
    Failed { step: String, error: String },
}

impl OrchestratorState {
    pub fn is_running(&self) -> bool {
        matches!(self, OrchestratorState::Running { .. })
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Idle => write!(f, "idle"),
            OrchestratorState::Running { step } => write!(f, "running ({})", step),
            OrchestratorState::Succeeded => write!(f, "succeeded"),
            OrchestratorState::Failed { step, error } => write!(f, "failed at {}: {}", step, error),
        }
    }
}
