//! Mock agent runner for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, RwLock};

use crate::domain::models::AgentCommand;
use crate::domain::ports::{AgentOutcome, AgentRunner};

/// Scripted outcome for one invocation.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Succeed with the given output.
    Succeed(String),
    /// Fail with the given message.
    Fail(String),
    /// Block until the attempt deadline elapses.
    Hang,
}

impl MockOutcome {
    pub fn succeed() -> Self {
        Self::Succeed("mock agent completed".to_string())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// Mock runner with per-agent outcome scripts.
///
/// Agents are keyed by `command.program`; tests build descriptors whose
/// program is the agent name. Each invocation consumes the next scripted
/// outcome; once a script is exhausted (or for unscripted agents) invocations
/// succeed.
pub struct MockAgentRunner {
    scripts: Arc<RwLock<HashMap<String, Vec<MockOutcome>>>>,
    invocations: Arc<Mutex<Vec<String>>>,
}

impl MockAgentRunner {
    pub fn new() -> Self {
        Self {
            scripts: Arc::new(RwLock::new(HashMap::new())),
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue outcomes for an agent, consumed in order.
    pub async fn script(&self, agent: impl Into<String>, outcomes: Vec<MockOutcome>) {
        let mut scripts = self.scripts.write().await;
        scripts.entry(agent.into()).or_default().extend(outcomes);
    }

    /// Invocation order across all agents.
    pub async fn invocations(&self) -> Vec<String> {
        self.invocations.lock().await.clone()
    }

    /// How many times one agent was invoked.
    pub async fn invocation_count(&self, agent: &str) -> usize {
        self.invocations
            .lock()
            .await
            .iter()
            .filter(|name| name.as_str() == agent)
            .count()
    }
}

impl Default for MockAgentRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRunner for MockAgentRunner {
    async fn run(
        &self,
        command: &AgentCommand,
        timeout: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> AgentOutcome {
        let agent = command.program.clone();
        self.invocations.lock().await.push(agent.clone());

        let outcome = {
            let mut scripts = self.scripts.write().await;
            match scripts.get_mut(&agent) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => MockOutcome::succeed(),
            }
        };

        match outcome {
            MockOutcome::Succeed(output) => AgentOutcome::Success { output },
            MockOutcome::Fail(message) => AgentOutcome::Failure { message },
            MockOutcome::Hang => {
                tokio::select! {
                    () = tokio::time::sleep(timeout) => AgentOutcome::TimedOut,
                    _ = shutdown.changed() => AgentOutcome::Cancelled,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shutdown_rx() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_script_consumed_in_order() {
        let runner = MockAgentRunner::new();
        runner
            .script(
                "pattern_recognition",
                vec![MockOutcome::fail("first"), MockOutcome::succeed()],
            )
            .await;

        let command = AgentCommand::new("pattern_recognition", vec![]);

        let first = runner
            .run(&command, Duration::from_secs(1), shutdown_rx())
            .await;
        assert!(matches!(first, AgentOutcome::Failure { .. }));

        let second = runner
            .run(&command, Duration::from_secs(1), shutdown_rx())
            .await;
        assert!(matches!(second, AgentOutcome::Success { .. }));

        assert_eq!(runner.invocation_count("pattern_recognition").await, 2);
    }

    #[tokio::test]
    async fn test_hang_times_out() {
        let runner = MockAgentRunner::new();
        runner.script("ab_testing", vec![MockOutcome::Hang]).await;

        let command = AgentCommand::new("ab_testing", vec![]);
        let outcome = runner
            .run(&command, Duration::from_millis(20), shutdown_rx())
            .await;
        assert_eq!(outcome, AgentOutcome::TimedOut);
    }
}
