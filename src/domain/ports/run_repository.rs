//! Repository port for the durable run state store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::PipelineResult;
use crate::domain::models::{PipelineRun, PipelineStatus, RunRecord};

/// Persistence port for pipeline runs and run records.
///
/// The store exclusively owns persisted records. The execution engine is the
/// only writer; the dependency resolver and health monitor are read-only
/// consumers. Records are append-per-attempt: `append` inserts an attempt
/// (usually in the Running state) and `mark_terminal` finalizes it exactly
/// once. Terminal rows are never mutated again and rows are never deleted.
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Register a new pipeline run.
    async fn create_run(&self, run: &PipelineRun) -> PipelineResult<()>;

    /// Fetch a pipeline run by id.
    async fn get_run(&self, run_id: Uuid) -> PipelineResult<Option<PipelineRun>>;

    /// Most recently started pipeline run, if any.
    async fn latest_run(&self) -> PipelineResult<Option<PipelineRun>>;

    /// Pipeline runs still marked Running (candidates for crash recovery).
    async fn open_runs(&self) -> PipelineResult<Vec<PipelineRun>>;

    /// Set a pipeline run's terminal status.
    async fn finish_run(
        &self,
        run_id: Uuid,
        status: PipelineStatus,
        finished_at: DateTime<Utc>,
    ) -> PipelineResult<()>;

    /// Durably insert a run record. Must survive a process crash immediately
    /// after this returns.
    async fn append(&self, record: &RunRecord) -> PipelineResult<()>;

    /// Finalize a previously appended record with its terminal fields.
    async fn mark_terminal(&self, record: &RunRecord) -> PipelineResult<()>;

    /// All records for one run, ordered by insertion.
    async fn load(&self, run_id: Uuid) -> PipelineResult<Vec<RunRecord>>;

    /// Most recent terminal record for the agent, across all runs.
    async fn latest_terminal(&self, agent_name: &str) -> PipelineResult<Option<RunRecord>>;

    /// Most recent Succeeded record for the agent, across all runs.
    async fn latest_success(&self, agent_name: &str) -> PipelineResult<Option<RunRecord>>;

    /// Most recent terminal records for the agent, newest first, capped at
    /// `limit`. Used for windowed health rates.
    async fn recent_terminal(
        &self,
        agent_name: &str,
        limit: usize,
    ) -> PipelineResult<Vec<RunRecord>>;

    /// Names of agents with a Running record in any run.
    async fn running_agents(&self) -> PipelineResult<Vec<String>>;
}
