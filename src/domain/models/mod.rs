//! Domain models for the orchestration engine.

pub mod agent;
pub mod config;
pub mod health;
pub mod run;

pub use agent::{AgentCommand, AgentDescriptor};
pub use config::{
    AgentOverrides, Config, DatabaseConfig, HealthConfig, LoggingConfig, StoreRetryConfig,
};
pub use health::{AgentHealth, HealthSnapshot};
pub use run::{overall_status, PipelineRun, PipelineStatus, RunRecord, RunStatus};
