//! Configuration model for the argus orchestrator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Execution environment: the python interpreter agents are launched with
    #[serde(default = "default_python_env")]
    pub python_env: String,

    /// Per-agent policy overrides, keyed by agent name
    #[serde(default)]
    pub agents: BTreeMap<String, AgentOverrides>,

    /// Maximum age of a dependency's last success for it to satisfy gating
    #[serde(default = "default_dependency_max_age")]
    pub dependency_max_age_seconds: u64,

    /// Optional overall wall-clock budget for one pipeline run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_deadline_seconds: Option<u64>,

    /// Webhook URLs notified on terminal agent failure
    #[serde(default)]
    pub notification_webhooks: Vec<String>,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Health thresholds used by the monitor
    #[serde(default)]
    pub health: HealthConfig,

    /// Retry policy for durable store writes
    #[serde(default)]
    pub store_retry: StoreRetryConfig,
}

fn default_python_env() -> String {
    "project_venv/bin/python".to_string()
}

const fn default_dependency_max_age() -> u64 {
    7200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            python_env: default_python_env(),
            agents: BTreeMap::new(),
            dependency_max_age_seconds: default_dependency_max_age(),
            pipeline_deadline_seconds: None,
            notification_webhooks: vec![],
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            health: HealthConfig::default(),
            store_retry: StoreRetryConfig::default(),
        }
    }
}

/// Per-agent overrides of the built-in descriptor defaults.
///
/// Every field is optional; unset fields keep the built-in value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_factor: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_interval_seconds: Option<u64>,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to the `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".argus/argus.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Stderr format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for the rotating JSON log file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: None,
        }
    }
}

/// Health thresholds used when deriving snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthConfig {
    /// Error rate above which an agent is unhealthy
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,

    /// Success rate below which an agent is unhealthy
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,

    /// Number of recent terminal attempts the rates are computed over
    #[serde(default = "default_window_runs")]
    pub window_runs: usize,
}

const fn default_max_error_rate() -> f64 {
    0.1
}

const fn default_min_success_rate() -> f64 {
    0.8
}

const fn default_window_runs() -> usize {
    20
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_error_rate: default_max_error_rate(),
            min_success_rate: default_min_success_rate(),
            window_runs: default_window_runs(),
        }
    }
}

/// Bounded retry policy for durable store writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreRetryConfig {
    /// Attempts before a write failure aborts the run
    #[serde(default = "default_store_max_retries")]
    pub max_retries: u32,

    /// Initial backoff between write attempts in milliseconds
    #[serde(default = "default_store_backoff_ms")]
    pub initial_backoff_ms: u64,
}

const fn default_store_max_retries() -> u32 {
    3
}

const fn default_store_backoff_ms() -> u64 {
    100
}

impl Default for StoreRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_store_max_retries(),
            initial_backoff_ms: default_store_backoff_ms(),
        }
    }
}
