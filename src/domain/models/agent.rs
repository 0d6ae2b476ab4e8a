//! Agent descriptor domain model.
//!
//! Descriptors are immutable configuration: the four analysis agents, their
//! dependencies, and their timeout/retry/backoff policies. The orchestrator
//! treats each agent as an opaque unit of work with a command and an
//! observable outcome.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How to start an agent's unit of work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCommand {
    /// Program to execute (e.g. the configured python interpreter)
    pub program: String,
    /// Arguments, typically the agent entry point script
    pub args: Vec<String>,
    /// Working directory; defaults to the process cwd
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl AgentCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            env: HashMap::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl std::fmt::Display for AgentCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Static definition of one analysis agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDescriptor {
    /// Unique, stable identifier (e.g. `pattern_recognition`)
    pub name: String,
    /// How to invoke the unit of work
    pub command: AgentCommand,
    /// Agents that must have a terminal success before this one is eligible
    pub dependencies: Vec<String>,
    /// Maximum wall-clock duration for one attempt
    pub timeout: Duration,
    /// Cap on attempts (an agent with `max_retries = 3` runs at most 3 times)
    pub max_retries: u32,
    /// First inter-attempt delay
    pub backoff_base: Duration,
    /// Multiplier applied per subsequent attempt
    pub backoff_factor: f64,
    /// Expected run cadence; staleness is judged against twice this value
    pub schedule_interval: Duration,
}

impl AgentDescriptor {
    /// Delay to wait before `attempt` (the first retry, attempt 2, waits
    /// `backoff_base`; the next waits `backoff_base * backoff_factor`, and
    /// so on).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 2, "no delay before the first attempt");
        let exponent = attempt.saturating_sub(2);
        let factor = self.backoff_factor.powi(exponent as i32);
        self.backoff_base.mul_f64(factor.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(base_ms: u64, factor: f64) -> AgentDescriptor {
        AgentDescriptor {
            name: "pattern_recognition".to_string(),
            command: AgentCommand::new("python", vec!["agent.py".to_string()]),
            dependencies: vec![],
            timeout: Duration::from_secs(300),
            max_retries: 3,
            backoff_base: Duration::from_millis(base_ms),
            backoff_factor: factor,
            schedule_interval: Duration::from_secs(900),
        }
    }

    #[test]
    fn test_backoff_schedule_is_non_decreasing() {
        let descriptor = descriptor(1000, 2.0);
        let delays: Vec<_> = (2..=5).map(|a| descriptor.backoff_delay(a)).collect();
        assert_eq!(delays[0], Duration::from_millis(1000));
        assert_eq!(delays[1], Duration::from_millis(2000));
        assert_eq!(delays[2], Duration::from_millis(4000));
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn test_backoff_factor_one_is_constant() {
        let descriptor = descriptor(500, 1.0);
        assert_eq!(descriptor.backoff_delay(2), Duration::from_millis(500));
        assert_eq!(descriptor.backoff_delay(4), Duration::from_millis(500));
    }

    #[test]
    fn test_command_display() {
        let command = AgentCommand::new(
            "project_venv/bin/python",
            vec!["agents/pattern-recognition/agent.py".to_string()],
        );
        assert_eq!(
            command.to_string(),
            "project_venv/bin/python agents/pattern-recognition/agent.py"
        );
    }
}
