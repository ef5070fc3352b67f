//! Agent configuration.
//!
//! The agent is configured by a JSON document whose path comes from the
//! `AGENT_CONFIG_FILE` environment variable. The document is produced by the
//! deployment pipeline, so unknown keys are ignored.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::constants::DEFAULT_CONFIG_PATH;
use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Base of the idle backoff range; the actual sleep is uniform in
    /// `[base, 2*base)` seconds.
    pub empty_task_queue_backoff_timeout_sec: u64,
    /// Yield cadence of the execution driver and the lease renewer.
    pub work_proc_status_pull_interval_sec: u64,
    /// Lease duration written to the status row.
    pub task_ttl_expiration_offset_sec: i64,
    /// Lease refresh cadence; must stay below the expiration offset.
    pub task_ttl_refresh_interval_sec: i64,
    /// 0/1: when 1 the task payload is fetched from the artifact store.
    pub task_input_passed_via_external_storage: u8,
    /// Queue visibility extension applied after a successful claim.
    pub agent_sqs_visibility_timeout_sec: i32,
    /// Selects the adaptive retry profile for renew/finish store calls.
    pub agent_use_congestion_control: bool,
    /// "1" enables the distributed-tracing layer.
    #[serde(default)]
    pub enable_xray: String,

    pub region: String,
    pub sqs_endpoint: String,
    pub sqs_queue: String,
    pub ddb_status_table: String,
    pub s3_bucket: String,
    /// Accepted for schema compatibility; the redis artifact backend is not
    /// supported by this agent.
    #[serde(default)]
    pub redis_url: String,
    pub grid_storage_service: String,

    #[serde(default)]
    pub metrics_are_enabled: String,
    #[serde(default)]
    pub metrics_pre_agent_connection_string: String,
    #[serde(default)]
    pub metrics_post_agent_connection_string: String,
    #[serde(default)]
    pub metrics_grafana_private_ip: String,
}

impl AgentConfig {
    /// Load the config from the path in `AGENT_CONFIG_FILE`, falling back to
    /// the default deployment path.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path =
            env::var("AGENT_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(Path::new(&path))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AgentConfig = serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The lease must outlive the refresh cadence, otherwise the watchdog
    /// can reclaim a task whose owner is still alive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_ttl_refresh_interval_sec >= self.task_ttl_expiration_offset_sec {
            return Err(ConfigError::Invalid(format!(
                "task_ttl_refresh_interval_sec ({}) must be less than \
                 task_ttl_expiration_offset_sec ({})",
                self.task_ttl_refresh_interval_sec, self.task_ttl_expiration_offset_sec
            )));
        }
        if self.work_proc_status_pull_interval_sec == 0 {
            return Err(ConfigError::Invalid(
                "work_proc_status_pull_interval_sec must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn external_input(&self) -> bool {
        self.task_input_passed_via_external_storage == 1
    }

    pub fn xray_enabled(&self) -> bool {
        self.enable_xray == "1"
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_are_enabled == "1"
    }
}
