//! Run record and pipeline run domain models.
//!
//! A `RunRecord` is one attempt of one agent within one pipeline run. Records
//! are append-per-attempt: inserted in the `Running` state and finalized
//! exactly once to a terminal status. A `PipelineRun` aggregates the records
//! of a single end-to-end invocation of the agent chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a single agent attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Attempt is scheduled but not yet started
    Pending,
    /// Attempt is currently executing
    Running,
    /// Unit of work completed successfully
    Succeeded,
    /// Unit of work reported failure (or the attempt was cancelled)
    Failed,
    /// Attempt was forcibly terminated at the deadline
    TimedOut,
    /// Agent never ran because a dependency did not succeed
    Skipped,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "succeeded" | "success" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "timed_out" | "timedout" => Some(Self::TimedOut),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Skipped
        )
    }

    /// Terminal states that must carry an error message.
    pub fn carries_error(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt of one agent within one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier
    pub id: Uuid,
    /// Pipeline run this attempt belongs to
    pub run_id: Uuid,
    /// Agent that was (or would have been) invoked
    pub agent_name: String,
    /// Current status
    pub status: RunStatus,
    /// 1-based attempt number; 0 for Skipped records (no unit of work ran)
    pub attempt: u32,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// When the attempt reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration of the attempt
    pub duration_ms: Option<i64>,
    /// Present iff status is Failed or TimedOut
    pub error_message: Option<String>,
}

impl RunRecord {
    /// Create a record for an attempt that is starting now.
    pub fn running(run_id: Uuid, agent_name: impl Into<String>, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            agent_name: agent_name.into(),
            status: RunStatus::Running,
            attempt,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            error_message: None,
        }
    }

    /// Create a terminal Skipped record for an agent that never ran.
    pub fn skipped(run_id: Uuid, agent_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            run_id,
            agent_name: agent_name.into(),
            status: RunStatus::Skipped,
            attempt: 0,
            started_at: now,
            finished_at: Some(now),
            duration_ms: Some(0),
            error_message: None,
        }
    }

    /// Finalize this attempt with a terminal status.
    ///
    /// Returns an error when the record is already terminal or when the
    /// status/error combination violates the model invariant.
    pub fn finish(
        &mut self,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<(), String> {
        if self.status.is_terminal() {
            return Err(format!(
                "record {} is already terminal ({})",
                self.id, self.status
            ));
        }
        if !status.is_terminal() {
            return Err(format!("cannot finish with non-terminal status {status}"));
        }
        if status.carries_error() && error_message.is_none() {
            return Err(format!("terminal status {status} requires an error message"));
        }
        if !status.carries_error() && error_message.is_some() {
            return Err(format!("terminal status {status} must not carry an error"));
        }

        let now = Utc::now();
        self.status = status;
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
        self.error_message = error_message;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Overall status of one end-to-end pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// At least one agent is not yet terminal
    Running,
    /// Every agent terminal-Succeeded
    Succeeded,
    /// At least one agent succeeded and at least one failed/timed out/skipped
    PartiallyFailed,
    /// No agent succeeded
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::PartiallyFailed => "partially_failed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "partially_failed" => Some(Self::PartiallyFailed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end-to-end invocation of the agent chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub status: PipelineStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a run that is starting now.
    pub fn started() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: PipelineStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Derive the overall status from the terminal statuses of every agent.
///
/// `agent_outcomes` holds the final per-agent status for the run, in any
/// order. Agents with no record yet make the run `Running`.
pub fn overall_status<'a, I>(agent_outcomes: I) -> PipelineStatus
where
    I: IntoIterator<Item = &'a RunStatus>,
{
    let mut any_success = false;
    let mut any_failure = false;
    let mut any_open = false;

    for status in agent_outcomes {
        match status {
            RunStatus::Succeeded => any_success = true,
            RunStatus::Failed | RunStatus::TimedOut | RunStatus::Skipped => any_failure = true,
            RunStatus::Pending | RunStatus::Running => any_open = true,
        }
    }

    if any_open {
        PipelineStatus::Running
    } else if any_failure && any_success {
        PipelineStatus::PartiallyFailed
    } else if any_failure {
        PipelineStatus::Failed
    } else {
        PipelineStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Succeeded,
            RunStatus::Failed,
            RunStatus::TimedOut,
            RunStatus::Skipped,
        ] {
            assert_eq!(RunStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_finish_requires_error_for_failure() {
        let mut record = RunRecord::running(Uuid::new_v4(), "pattern_recognition", 1);
        assert!(record.finish(RunStatus::Failed, None).is_err());
        assert!(record
            .finish(RunStatus::Failed, Some("exit code 1".to_string()))
            .is_ok());
        assert!(record.is_terminal());
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_finish_rejects_error_on_success() {
        let mut record = RunRecord::running(Uuid::new_v4(), "pattern_recognition", 1);
        assert!(record
            .finish(RunStatus::Succeeded, Some("spurious".to_string()))
            .is_err());
        assert!(record.finish(RunStatus::Succeeded, None).is_ok());
    }

    #[test]
    fn test_finish_is_one_shot() {
        let mut record = RunRecord::running(Uuid::new_v4(), "ab_testing", 1);
        record.finish(RunStatus::Succeeded, None).unwrap();
        assert!(record.finish(RunStatus::Failed, Some("late".to_string())).is_err());
    }

    #[test]
    fn test_skipped_record_shape() {
        let record = RunRecord::skipped(Uuid::new_v4(), "insights_engine");
        assert_eq!(record.status, RunStatus::Skipped);
        assert_eq!(record.attempt, 0);
        assert!(record.error_message.is_none());
        assert!(record.is_terminal());
    }

    #[test]
    fn test_overall_status() {
        use RunStatus::{Failed, Running, Skipped, Succeeded};

        assert_eq!(
            overall_status([&Succeeded, &Succeeded]),
            PipelineStatus::Succeeded
        );
        assert_eq!(
            overall_status([&Succeeded, &Failed, &Skipped]),
            PipelineStatus::PartiallyFailed
        );
        assert_eq!(
            overall_status([&Failed, &Skipped, &Skipped]),
            PipelineStatus::Failed
        );
        assert_eq!(
            overall_status([&Succeeded, &Running]),
            PipelineStatus::Running
        );
    }
}
