//! Health snapshot models.
//!
//! Snapshots are derived from run records on demand and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time health of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent: String,
    /// Error rate within threshold, success rate within threshold, not stale
    pub healthy: bool,
    /// Terminal attempts inside the window
    pub total_runs: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub last_success: Option<DateTime<Utc>>,
    pub seconds_since_success: Option<i64>,
    /// `now - last_success > 2 * schedule_interval` (or never succeeded)
    pub stale: bool,
    pub currently_running: bool,
    /// Mean duration of successful attempts inside the window
    pub avg_duration_ms: Option<i64>,
}

/// Point-in-time health of the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    /// At least 75% of agents healthy
    pub overall_healthy: bool,
    pub health_percentage: f64,
    pub healthy_agents: usize,
    pub total_agents: usize,
    pub agents: Vec<AgentHealth>,
    pub currently_running: Vec<String>,
}

impl HealthSnapshot {
    /// Human-readable issues for unhealthy agents, for operator display.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for agent in &self.agents {
            if agent.healthy {
                continue;
            }
            if agent.stale {
                match agent.seconds_since_success {
                    Some(secs) => issues.push(format!(
                        "{} has not succeeded in {:.1} hours",
                        agent.agent,
                        secs as f64 / 3600.0
                    )),
                    None => issues.push(format!("{} has never succeeded", agent.agent)),
                }
            }
            if agent.total_runs > 0 && agent.error_rate > 0.0 {
                issues.push(format!(
                    "{} error rate {:.0}% over last {} attempts",
                    agent.agent,
                    agent.error_rate * 100.0,
                    agent.total_runs
                ));
            }
        }
        issues
    }
}
