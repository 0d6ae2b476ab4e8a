//! Invocation port for agent units of work.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::domain::models::AgentCommand;

/// Outcome of one agent invocation.
///
/// Exactly one of these is produced per attempt; the runner never returns an
/// error. Infrastructure problems (spawn failure, missing interpreter) are
/// reported as `Failure` so the engine's retry policy applies uniformly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Unit of work exited successfully; carries the tail of its stdout.
    Success { output: String },
    /// Unit of work reported failure (non-zero exit, spawn error, ...).
    Failure { message: String },
    /// The deadline elapsed and the unit of work was forcibly terminated.
    TimedOut,
    /// A shutdown signal arrived mid-attempt; the unit of work was terminated.
    Cancelled,
}

/// Port for invoking one opaque unit of work with a bounded lifetime.
///
/// Implementations must forcibly terminate the work on timeout or
/// cancellation; nothing may keep running in the background after `run`
/// returns. Re-invocation on retry must be safe.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        command: &AgentCommand,
        timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> AgentOutcome;
}
