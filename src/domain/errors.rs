//! Domain errors for the argus orchestration engine.

use thiserror::Error;
use uuid::Uuid;

/// Format a cycle path as a human-readable string: `a -> b -> c -> a`.
fn format_cycle_path(path: &[String]) -> String {
    path.join(" -> ")
}

/// Errors that can occur while orchestrating the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid registry or configuration. Fatal at startup, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Agent dependency cycle detected: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<String>),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Not a failure: the agent is simply not eligible to be scheduled.
    #[error("Dependencies not met for agent {agent}: {unmet:?}")]
    DependencyNotMet { agent: String, unmet: Vec<String> },

    /// The unit of work reported failure. Retried up to `max_retries`.
    #[error("Agent {agent} execution failed: {message}")]
    AgentExecution { agent: String, message: String },

    /// The attempt deadline elapsed. Retried up to `max_retries`.
    #[error("Agent {agent} timed out after {timeout_secs}s")]
    AgentTimeout { agent: String, timeout_secs: u64 },

    /// Durable persistence failed after bounded retries. Aborts the run:
    /// downstream correctness depends on durable, accurate state.
    #[error("Run state store write failed after {attempts} attempts: {message}")]
    StoreWrite { attempts: u32, message: String },

    #[error("Pipeline run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}
