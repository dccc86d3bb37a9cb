//! Fleet orchestration
//!
//! One update-and-restart sequence at a time:
//! `selectCollections` on the configuration manager, then `stopAll`,
//! `clearAll`, `updateAll` and `startAll` on the main device. The first
//! failing step ends the sequence; earlier steps are not undone.

mod engine;
mod error;
mod sequence;

pub use engine::{
    MSG_FAILURE, MSG_SUCCESS, Orchestrator, OrchestratorConfig, STEP_CLEAR_ALL, STEP_SELECT_COLLECTIONS,
    STEP_START_ALL, STEP_STOP_ALL, STEP_UPDATE_ALL,
};
pub use error::OrchestratorError;
pub use sequence::{OrchestratorState, SequenceStep, StepFuture};
