//! Argus - Analytics Pipeline Orchestrator
//!
//! Argus runs a fixed DAG of analysis agents in dependency order, enforces
//! per-attempt timeouts, retries failures with declarative backoff, persists
//! run state durably across restarts, and exposes live health information to
//! an independent monitor.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models (descriptors, run records, health
//!   snapshots, configuration), errors, and ports
//! - **Adapters** (`adapters`): SQLite run state store, process agent runner
//! - **Service Layer** (`services`): registry, dependency resolver, execution
//!   engine, health monitor, failure notifier
//! - **Infrastructure** (`infrastructure`): configuration loading, logging
//! - **CLI Layer** (`cli`): operator command surface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{PipelineError, PipelineResult};
pub use domain::models::{
    AgentCommand, AgentDescriptor, AgentHealth, Config, HealthSnapshot, PipelineRun,
    PipelineStatus, RunRecord, RunStatus,
};
pub use domain::ports::{AgentOutcome, AgentRunner, RunRepository};
pub use infrastructure::config::ConfigLoader;
pub use services::{
    AgentRegistry, DependencyResolver, ExecutorConfig, HealthMonitor, PipelineExecutor,
    PipelineOutcome, RunOptions,
};
