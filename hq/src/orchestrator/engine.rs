//! Update-and-restart sequence over the fleet

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::error::OrchestratorError;
use super::sequence::{OrchestratorState, SequenceStep};
use crate::domain::DeviceKey;
use crate::events::{CHANNEL_LOG, EventBus, TOPIC_ERROR, TOPIC_LOG};
use crate::transport::{Transport, TransportError};

pub const STEP_SELECT_COLLECTIONS: &str = "selectCollections";
pub const STEP_STOP_ALL: &str = "stopAll";
pub const STEP_CLEAR_ALL: &str = "clearAll";
pub const STEP_UPDATE_ALL: &str = "updateAll";
pub const STEP_START_ALL: &str = "startAll";

pub const MSG_SUCCESS: &str = "Successfully updated and restarted fleet";
pub const MSG_FAILURE: &str = "Failed to update and restart fleet";
const MISSING_MAIN: &str = "main server has not been set!";
const MISSING_CONFIGURATION_MANAGER: &str = "configuration manager has not been set!";
const CANCELLED: &str = "cancelled";

/// Devices and limits for one orchestrator
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Device that fans stop/clear/update/start out to the fleet
    pub main: Option<DeviceKey>,
    /// Device that stores the collection selection
    pub configuration_manager: Option<DeviceKey>,
    /// Limit on each step; unset waits for the transport
    pub step_timeout: Option<Duration>,
    /// Limit on the whole sequence
    pub sequence_timeout: Option<Duration>,
}

/// Runs fail-fast command sequences, one at a time
pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    bus: Arc<EventBus>,
    config: OrchestratorConfig,
    state: Mutex<OrchestratorState>,
}

impl Orchestrator {
    pub fn new(transport: Arc<dyn Transport>, bus: Arc<EventBus>, config: OrchestratorConfig) -> Self {
        debug!(?config, "Orchestrator::new: called");
        Self {
            transport,
            bus,
            config,
            state: Mutex::new(OrchestratorState::Idle),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Current state snapshot
    pub fn state(&self) -> OrchestratorState {
        self.state.lock().clone()
    }

    /// Select `collections` on the configuration manager, then stop, clear,
    /// update and start the fleet through the main device
    pub async fn run(&self, collections: &[String]) -> Result<(), OrchestratorError> {
        debug!(?collections, "Orchestrator::run: called");
        let (main, manager) = self.devices()?;
        let steps = self.update_and_restart_steps(main, manager, collections);
        self.run_sequence(steps).await
    }

    /// Execute `steps` in order, stopping at the first failure
    ///
    /// Publishes exactly one outcome event once the sequence has started.
    pub async fn run_sequence(&self, steps: Vec<SequenceStep>) -> Result<(), OrchestratorError> {
        debug!(steps = steps.len(), "Orchestrator::run_sequence: called");
        {
            let mut state = self.state.lock();
            if state.is_running() {
                let current = state.to_string();
                warn!(%current, "Orchestrator: rejecting overlapping run");
                return Err(OrchestratorError::AlreadyRunning);
            }
            *state = OrchestratorState::Running {
                step: steps.first().map(|s| s.name().to_string()).unwrap_or_default(),
            };
        }

        let mut guard = RunGuard::new(&self.state);
        let outcome = match self.config.sequence_timeout {
            Some(limit) => match timeout(limit, self.execute(steps)).await {
                Ok(outcome) => outcome,
                Err(_) => Err((self.current_step(), TransportError::Timeout(limit))),
            },
            None => self.execute(steps).await,
        };

        guard.disarm();
        match outcome {
            Ok(()) => {
                *self.state.lock() = OrchestratorState::Succeeded;
                info!("Orchestrator: sequence succeeded");
                self.bus.publish(TOPIC_LOG, MSG_SUCCESS, CHANNEL_LOG);
                Ok(())
            }
            Err((step, source)) => {
                *self.state.lock() = OrchestratorState::Failed {
                    step: step.clone(),
                    error: source.to_string(),
                };
                error!(%step, error = %source, "Orchestrator: sequence failed");
                self.bus.publish(TOPIC_ERROR, MSG_FAILURE, CHANNEL_LOG);
                Err(OrchestratorError::StepFailed { step, source })
            }
        }
    }

    async fn execute(&self, steps: Vec<SequenceStep>) -> Result<(), (String, TransportError)> {
        for step in steps {
            let (name, future) = step.start();
            *self.state.lock() = OrchestratorState::Running { step: name.clone() };
            debug!(step = %name, "Orchestrator::execute: issuing step");

            let result = match self.config.step_timeout {
                Some(limit) => timeout(limit, future)
                    .await
                    .unwrap_or(Err(TransportError::Timeout(limit))),
                None => future.await,
            };
            if let Err(e) = result {
                return Err((name, e));
            }
        }
        Ok(())
    }

    fn current_step(&self) -> String {
        match &*self.state.lock() {
            OrchestratorState::Running { step } => step.clone(),
            _ => String::new(),
        }
    }

    fn devices(&self) -> Result<(DeviceKey, DeviceKey), OrchestratorError> {
        let Some(main) = self.config.main.clone() else {
            return Err(self.configuration_error(MISSING_MAIN));
        };
        let Some(manager) = self.config.configuration_manager.clone() else {
            return Err(self.configuration_error(MISSING_CONFIGURATION_MANAGER));
        };
        Ok((main, manager))
    }

    fn configuration_error(&self, reason: &str) -> OrchestratorError {
        let err = OrchestratorError::Configuration(reason.to_string());
        warn!(error = %err, "Orchestrator: precondition failed");
        self.bus.publish(TOPIC_LOG, err.to_string(), CHANNEL_LOG);
        err
    }

    fn update_and_restart_steps(
        &self,
        main: DeviceKey,
        manager: DeviceKey,
        collections: &[String],
    ) -> Vec<SequenceStep> {
        let selection = Value::from(collections.to_vec());
        let mut steps = vec![self.command_step(manager, STEP_SELECT_COLLECTIONS, Some(selection))];
        for command in [STEP_STOP_ALL, STEP_CLEAR_ALL, STEP_UPDATE_ALL, STEP_START_ALL] {
            steps.push(self.command_step(main.clone(), command, None));
        }
        steps
    }

    fn command_step(&self, device: DeviceKey, command: &'static str, args: Option<Value>) -> SequenceStep {
        let transport = self.transport.clone();
        SequenceStep::new(command, move || async move {
            transport.execute_command(&device, command, args).await
        })
    }
}

/// Moves a run whose future was dropped from `Running` to `Failed`
struct RunGuard<'a> {
    state: &'a Mutex<OrchestratorState>,
    armed: bool,
}

impl<'a> RunGuard<'a> {
    fn new(state: &'a Mutex<OrchestratorState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        let step = match &*state {
            OrchestratorState::Running { step } => step.clone(),
            _ => return,
        };
        warn!(%step, "Orchestrator: run abandoned mid-sequence");
        *state = OrchestratorState::Failed {
            step,
            error: CANCELLED.to_string(),
        };
    }
}
