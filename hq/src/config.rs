//! FleetHQ configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::aggregator::DEFAULT_WINDOW_MS;
use crate::domain::{DeviceKey, ManagedServerRecord, ServerRegistry};
use crate::events::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_LOG_CAPACITY, MAX_LOG_CAPACITY};
use crate::orchestrator::OrchestratorConfig;
use crate::transport::DEFAULT_POLL_INTERVAL_MS;

/// Project-local config file, looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = ".fleethq.yml";

/// Main FleetHQ configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gateway connection
    pub transport: TransportConfig,

    /// Managed servers and the devices the orchestrator drives
    pub fleet: FleetConfig,

    /// Update aggregation
    pub aggregator: AggregatorConfig,

    /// Rolling log
    pub log: LogConfig,

    /// State/Status polling
    pub poller: PollerConfig,

    /// Orchestrator limits
    pub orchestrator: OrchestratorSettings,

    /// Event bus
    pub bus: BusConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.log.capacity == 0 || self.log.capacity > MAX_LOG_CAPACITY {
            return Err(eyre::eyre!(
                "log.capacity must be between 1 and {}, got {}",
                MAX_LOG_CAPACITY,
                self.log.capacity
            ));
        }
        if self.aggregator.window_ms == 0 {
            return Err(eyre::eyre!("aggregator.window-ms must be greater than zero"));
        }
        if self.poller.interval_ms == 0 {
            return Err(eyre::eyre!("poller.interval-ms must be greater than zero"));
        }
        if self.bus.channel_capacity == 0 {
            return Err(eyre::eyre!("bus.channel-capacity must be greater than zero"));
        }
        if let Some(main) = &self.fleet.main
            && !self.fleet.servers.iter().any(|s| &s.id == main)
        {
            return Err(eyre::eyre!("fleet.main '{}' is not one of fleet.servers", main));
        }
        Ok(())
    }

    /// Config files tried by [`load`](Self::load) when no path is given, in order
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fleethq").join("fleethq.yml"));
        }
        paths
    }

    /// Load `config_path`, else the first readable file from [`search_paths`](Self::search_paths), else defaults
    ///
    /// An explicit path must load. A search path that exists but does not
    /// parse is skipped with a warning.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        debug!(?config_path, "Config::load: called");
        if let Some(path) = config_path {
            return Self::from_file(path).with_context(|| format!("Failed to load config from {}", path.display()));
        }

        for path in Self::search_paths().into_iter().filter(|p| p.exists()) {
            match Self::from_file(&path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!(path = %path.display(), error = %e, "Config::load: skipping config file"),
            }
        }

        info!("Config::load: no config file found, using defaults");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        info!(path = %path.display(), "Config::from_file: loaded");
        Ok(config)
    }

    /// Registry built from `fleet.servers`
    pub fn registry(&self) -> ServerRegistry {
        ServerRegistry::new(self.fleet.servers.iter().map(ManagedServerRecord::from))
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            main: self.fleet.main.clone(),
            configuration_manager: self.fleet.configuration_manager.clone(),
            step_timeout: self.orchestrator.step_timeout_ms.map(Duration::from_millis),
            sequence_timeout: self.orchestrator.sequence_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Gateway connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// REST gateway base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/tango/rest/rc4".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One managed server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// `host/device`
    pub id: DeviceKey,

    /// Display name used in topics and logs
    pub name: String,
}

impl From<&ServerEntry> for ManagedServerRecord {
    fn from(entry: &ServerEntry) -> Self {
        ManagedServerRecord::new(entry.id.clone(), entry.name.clone())
    }
}

/// Managed servers and orchestration targets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub servers: Vec<ServerEntry>,

    /// Device receiving stopAll/clearAll/updateAll/startAll
    pub main: Option<DeviceKey>,

    /// Device receiving selectCollections
    #[serde(rename = "configuration-manager")]
    pub configuration_manager: Option<DeviceKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Window length in milliseconds
    #[serde(rename = "window-ms")]
    pub window_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

impl AggregatorConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Entries retained, newest first
    pub capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Orchestrator limits; unset means no limit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    #[serde(rename = "step-timeout-ms")]
    pub step_timeout_ms: Option<u64>,

    #[serde(rename = "sequence-timeout-ms")]
    pub sequence_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Broadcast channel capacity for async receivers
    #[serde(rename = "channel-capacity")]
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
