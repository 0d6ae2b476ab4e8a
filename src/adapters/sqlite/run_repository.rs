//! SQLite implementation of the RunRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{PipelineRun, PipelineStatus, RunRecord, RunStatus};
use crate::domain::ports::RunRepository;

#[derive(Clone)]
pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn create_run(&self, run: &PipelineRun) -> PipelineResult<()> {
        sqlx::query(
            "INSERT INTO pipeline_runs (id, status, started_at, finished_at) VALUES (?, ?, ?, ?)",
        )
        .bind(run.id.to_string())
        .bind(run.status.as_str())
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> PipelineResult<Option<PipelineRun>> {
        let row: Option<PipelineRunRow> =
            sqlx::query_as("SELECT * FROM pipeline_runs WHERE id = ?")
                .bind(run_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn latest_run(&self) -> PipelineResult<Option<PipelineRun>> {
        let row: Option<PipelineRunRow> =
            sqlx::query_as("SELECT * FROM pipeline_runs ORDER BY started_at DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn open_runs(&self) -> PipelineResult<Vec<PipelineRun>> {
        let rows: Vec<PipelineRunRow> = sqlx::query_as(
            "SELECT * FROM pipeline_runs WHERE status = 'running' ORDER BY started_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: PipelineStatus,
        finished_at: DateTime<Utc>,
    ) -> PipelineResult<()> {
        let result = sqlx::query(
            "UPDATE pipeline_runs SET status = ?, finished_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(finished_at.to_rfc3339())
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::RunNotFound(run_id));
        }
        Ok(())
    }

    async fn append(&self, record: &RunRecord) -> PipelineResult<()> {
        sqlx::query(
            r"INSERT INTO run_records
              (id, run_id, agent_name, status, attempt, started_at, finished_at, duration_ms, error_message)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.run_id.to_string())
        .bind(&record.agent_name)
        .bind(record.status.as_str())
        .bind(i64::from(record.attempt))
        .bind(record.started_at.to_rfc3339())
        .bind(record.finished_at.map(|t| t.to_rfc3339()))
        .bind(record.duration_ms)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_terminal(&self, record: &RunRecord) -> PipelineResult<()> {
        if !record.status.is_terminal() {
            return Err(PipelineError::InvalidTransition(format!(
                "record {} is not terminal ({})",
                record.id, record.status
            )));
        }

        // Guard in SQL too: a terminal row is never overwritten.
        let result = sqlx::query(
            r"UPDATE run_records
              SET status = ?, finished_at = ?, duration_ms = ?, error_message = ?
              WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(record.status.as_str())
        .bind(record.finished_at.map(|t| t.to_rfc3339()))
        .bind(record.duration_ms)
        .bind(&record.error_message)
        .bind(record.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::InvalidTransition(format!(
                "record {} missing or already terminal",
                record.id
            )));
        }
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> PipelineResult<Vec<RunRecord>> {
        let rows: Vec<RunRecordRow> = sqlx::query_as(
            "SELECT * FROM run_records WHERE run_id = ? ORDER BY started_at, attempt",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn latest_terminal(&self, agent_name: &str) -> PipelineResult<Option<RunRecord>> {
        let row: Option<RunRecordRow> = sqlx::query_as(
            r"SELECT * FROM run_records
              WHERE agent_name = ? AND status IN ('succeeded', 'failed', 'timed_out', 'skipped')
              ORDER BY finished_at DESC LIMIT 1",
        )
        .bind(agent_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn latest_success(&self, agent_name: &str) -> PipelineResult<Option<RunRecord>> {
        let row: Option<RunRecordRow> = sqlx::query_as(
            r"SELECT * FROM run_records
              WHERE agent_name = ? AND status = 'succeeded'
              ORDER BY finished_at DESC LIMIT 1",
        )
        .bind(agent_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn recent_terminal(
        &self,
        agent_name: &str,
        limit: usize,
    ) -> PipelineResult<Vec<RunRecord>> {
        let rows: Vec<RunRecordRow> = sqlx::query_as(
            r"SELECT * FROM run_records
              WHERE agent_name = ? AND status IN ('succeeded', 'failed', 'timed_out', 'skipped')
              ORDER BY finished_at DESC LIMIT ?",
        )
        .bind(agent_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn running_agents(&self) -> PipelineResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT agent_name FROM run_records WHERE status = 'running'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

#[derive(sqlx::FromRow)]
struct PipelineRunRow {
    id: String,
    status: String,
    started_at: String,
    finished_at: Option<String>,
}

impl TryFrom<PipelineRunRow> for PipelineRun {
    type Error = PipelineError;

    fn try_from(row: PipelineRunRow) -> Result<Self, Self::Error> {
        Ok(PipelineRun {
            id: parse_uuid(&row.id)?,
            status: PipelineStatus::from_str(&row.status).ok_or_else(|| {
                PipelineError::Serialization(format!("Invalid pipeline status: {}", row.status))
            })?,
            started_at: parse_timestamp(&row.started_at)?,
            finished_at: row.finished_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RunRecordRow {
    id: String,
    run_id: String,
    agent_name: String,
    status: String,
    attempt: i64,
    started_at: String,
    finished_at: Option<String>,
    duration_ms: Option<i64>,
    error_message: Option<String>,
}

impl TryFrom<RunRecordRow> for RunRecord {
    type Error = PipelineError;

    fn try_from(row: RunRecordRow) -> Result<Self, Self::Error> {
        Ok(RunRecord {
            id: parse_uuid(&row.id)?,
            run_id: parse_uuid(&row.run_id)?,
            agent_name: row.agent_name,
            status: RunStatus::from_str(&row.status).ok_or_else(|| {
                PipelineError::Serialization(format!("Invalid run status: {}", row.status))
            })?,
            attempt: u32::try_from(row.attempt)
                .map_err(|e| PipelineError::Serialization(e.to_string()))?,
            started_at: parse_timestamp(&row.started_at)?,
            finished_at: row.finished_at.as_deref().map(parse_timestamp).transpose()?,
            duration_ms: row.duration_ms,
            error_message: row.error_message,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, PipelineError> {
    Uuid::parse_str(s).map_err(|e| PipelineError::Serialization(e.to_string()))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, PipelineError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PipelineError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_test_pool;

    async fn setup_test_repo() -> SqliteRunRepository {
        let pool = create_test_pool().await.unwrap();
        SqliteRunRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get_run() {
        let repo = setup_test_repo().await;
        let run = PipelineRun::started();

        repo.create_run(&run).await.unwrap();

        let loaded = repo.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, run.id);
        assert_eq!(loaded.status, PipelineStatus::Running);
        assert!(loaded.finished_at.is_none());
    }

    #[tokio::test]
    async fn test_append_and_mark_terminal() {
        let repo = setup_test_repo().await;
        let run = PipelineRun::started();
        repo.create_run(&run).await.unwrap();

        let mut record = RunRecord::running(run.id, "pattern_recognition", 1);
        repo.append(&record).await.unwrap();

        record.finish(RunStatus::Succeeded, None).unwrap();
        repo.mark_terminal(&record).await.unwrap();

        let records = repo.load(run.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RunStatus::Succeeded);
        assert!(records[0].duration_ms.is_some());

        // Terminal rows are never overwritten.
        let mut stale = records[0].clone();
        stale.status = RunStatus::Failed;
        stale.error_message = Some("late write".to_string());
        assert!(repo.mark_terminal(&stale).await.is_err());
    }

    #[tokio::test]
    async fn test_latest_terminal_and_success() {
        let repo = setup_test_repo().await;
        let run = PipelineRun::started();
        repo.create_run(&run).await.unwrap();

        let mut first = RunRecord::running(run.id, "ab_testing", 1);
        repo.append(&first).await.unwrap();
        first
            .finish(RunStatus::Failed, Some("exit code 2".to_string()))
            .unwrap();
        repo.mark_terminal(&first).await.unwrap();

        let mut second = RunRecord::running(run.id, "ab_testing", 2);
        repo.append(&second).await.unwrap();
        second.finish(RunStatus::Succeeded, None).unwrap();
        repo.mark_terminal(&second).await.unwrap();

        let latest = repo.latest_terminal("ab_testing").await.unwrap().unwrap();
        assert_eq!(latest.attempt, 2);

        let success = repo.latest_success("ab_testing").await.unwrap().unwrap();
        assert_eq!(success.id, second.id);

        assert!(repo.latest_terminal("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_runs_and_finish() {
        let repo = setup_test_repo().await;
        let run = PipelineRun::started();
        repo.create_run(&run).await.unwrap();

        let open = repo.open_runs().await.unwrap();
        assert_eq!(open.len(), 1);

        repo.finish_run(run.id, PipelineStatus::Succeeded, Utc::now())
            .await
            .unwrap();
        assert!(repo.open_runs().await.unwrap().is_empty());

        let finished = repo.get_run(run.id).await.unwrap().unwrap();
        assert_eq!(finished.status, PipelineStatus::Succeeded);
        assert!(finished.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_running_agents() {
        let repo = setup_test_repo().await;
        let run = PipelineRun::started();
        repo.create_run(&run).await.unwrap();

        let record = RunRecord::running(run.id, "insights_engine", 1);
        repo.append(&record).await.unwrap();

        let running = repo.running_agents().await.unwrap();
        assert_eq!(running, vec!["insights_engine".to_string()]);
    }
}
