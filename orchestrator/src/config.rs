//! Orchestrator configuration
//!
//! Configuration is layered: built-in defaults, an optional JSON file, then
//! `ORCH_*` environment variables (a `.env` file is honoured). The binary
//! applies its command line flags last.

use serde::{Deserialize, Serialize};
use shared::Domain;
use std::path::Path;
use std::time::Duration;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Top-level configuration for an orchestrator instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Domains this instance may route work to
    pub domains: Vec<Domain>,
    pub sharding: ShardingConfig,
    pub decision: DecisionConfig,
    pub partition: PartitionConfig,
    pub state_machine: StateMachineConfig,
    pub communication: CommunicationConfig,
    /// Settled assignments kept for lookup after they leave the in-flight set
    pub assignment_history_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingConfig {
    /// Complexity score above which a task is split
    pub complexity_threshold: f64,
    /// File count above which a task is split regardless of score
    pub max_files_per_task: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Complexity above which the hybrid algorithm is used
    pub high_complexity_threshold: f64,
    /// Normalised system load above which load balancing is used
    pub high_load_threshold: f64,
    /// In-flight tasks at which a domain stops receiving work
    pub max_concurrent_per_domain: u32,
    pub history_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Permit a resource to be owned by more than one domain
    pub allow_redundancy: bool,
    /// Run the correction pass when validation fails
    pub auto_correct: bool,
    /// Relative deviation from the mean load that triggers an advisory
    pub imbalance_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMachineConfig {
    pub recovery_delay_ms: u64,
    pub history_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicationConfig {
    pub retry_interval_ms: u64,
    pub retry_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub default_max_retries: u32,
    pub history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            domains: Domain::ALL.to_vec(),
            sharding: ShardingConfig::default(),
            decision: DecisionConfig::default(),
            partition: PartitionConfig::default(),
            state_machine: StateMachineConfig::default(),
            communication: CommunicationConfig::default(),
            assignment_history_limit: 10_000,
        }
    }
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 100.0,
            max_files_per_task: 20,
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            high_complexity_threshold: 150.0,
            high_load_threshold: 0.8,
            max_concurrent_per_domain: 5,
            history_limit: 10_000,
        }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            allow_redundancy: false,
            auto_correct: true,
            imbalance_threshold: 0.3,
        }
    }
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            recovery_delay_ms: 5_000,
            history_limit: 1_000,
        }
    }
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 10_000,
            retry_delay_ms: 1_000,
            heartbeat_interval_ms: 30_000,
            reconnect_delay_ms: 5_000,
            default_max_retries: 3,
            history_limit: 10_000,
        }
    }
}

impl StateMachineConfig {
    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }
}

impl CommunicationConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl OrchestratorConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> OrchestratorResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with environment variables
    pub fn from_env() -> OrchestratorResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `ORCH_*` environment overrides on top of this configuration
    pub fn with_env_overrides(mut self) -> OrchestratorResult<Self> {
        // A missing .env file is normal
        let _ = dotenv::dotenv();

        if let Some(domains) = env_value::<String>("ORCH_DOMAINS")? {
            self.domains = domains
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().parse::<Domain>().map_err(OrchestratorError::config))
                .collect::<OrchestratorResult<Vec<_>>>()?;
        }
        if let Some(v) = env_value("ORCH_COMPLEXITY_THRESHOLD")? {
            self.sharding.complexity_threshold = v;
        }
        if let Some(v) = env_value("ORCH_MAX_FILES_PER_TASK")? {
            self.sharding.max_files_per_task = v;
        }
        if let Some(v) = env_value("ORCH_MAX_CONCURRENT_PER_DOMAIN")? {
            self.decision.max_concurrent_per_domain = v;
        }
        if let Some(v) = env_value("ORCH_ALLOW_REDUNDANCY")? {
            self.partition.allow_redundancy = v;
        }
        if let Some(v) = env_value("ORCH_AUTO_CORRECT")? {
            self.partition.auto_correct = v;
        }
        if let Some(v) = env_value("ORCH_RECOVERY_DELAY_MS")? {
            self.state_machine.recovery_delay_ms = v;
        }
        if let Some(v) = env_value("ORCH_RETRY_INTERVAL_MS")? {
            self.communication.retry_interval_ms = v;
        }
        if let Some(v) = env_value("ORCH_RETRY_DELAY_MS")? {
            self.communication.retry_delay_ms = v;
        }
        if let Some(v) = env_value("ORCH_HEARTBEAT_INTERVAL_MS")? {
            self.communication.heartbeat_interval_ms = v;
        }
        if let Some(v) = env_value("ORCH_MAX_RETRIES")? {
            self.communication.default_max_retries = v;
        }
        if let Some(v) = env_value("ORCH_ASSIGNMENT_HISTORY_LIMIT")? {
            self.assignment_history_limit = v;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject configurations the components cannot run with
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.domains.is_empty() {
            return Err(OrchestratorError::config("domains must not be empty"));
        }
        if self.sharding.complexity_threshold <= 0.0 {
            return Err(OrchestratorError::config("sharding.complexity_threshold must be positive"));
        }
        if !(0.0..=1.0).contains(&self.decision.high_load_threshold) {
            return Err(OrchestratorError::config("decision.high_load_threshold must be within 0..=1"));
        }
        if self.decision.max_concurrent_per_domain == 0 {
            return Err(OrchestratorError::config("decision.max_concurrent_per_domain must be positive"));
        }
        if self.partition.imbalance_threshold <= 0.0 {
            return Err(OrchestratorError::config("partition.imbalance_threshold must be positive"));
        }
        let comm = &self.communication;
        if comm.retry_interval_ms == 0 || comm.heartbeat_interval_ms == 0 || comm.retry_delay_ms == 0 {
            return Err(OrchestratorError::config("communication intervals must be non-zero"));
        }
        if comm.history_limit == 0
            || self.decision.history_limit == 0
            || self.state_machine.history_limit == 0
            || self.assignment_history_limit == 0
        {
            return Err(OrchestratorError::config("history limits must be non-zero"));
        }
        Ok(())
    }
}

fn env_value<T: std::str::FromStr>(key: &str) -> OrchestratorResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| OrchestratorError::config(format!("{key}={raw}"))),
        Err(_) => Ok(None),
    }
}
