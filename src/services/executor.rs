//! Pipeline execution engine.
//!
//! Drives agents through `Pending -> Running -> {Succeeded | Failed |
//! TimedOut}` with declarative retry/backoff, propagates `Skipped` to the
//! transitive dependents of terminally failed agents, persists every attempt
//! through the run state store, and resumes crashed runs without re-invoking
//! agents that already succeeded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{
    overall_status, AgentDescriptor, PipelineRun, PipelineStatus, RunRecord, RunStatus,
};
use crate::domain::ports::{AgentOutcome, AgentRunner, RunRepository};
use crate::services::dependency_resolver::{DependencyResolver, EligibilityContext};
use crate::services::notifier::FailureNotifier;
use crate::services::registry::AgentRegistry;
use crate::services::retry::StoreRetryPolicy;

/// Engine-level policy knobs.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum age of a dependency's last success for it to satisfy gating.
    pub dependency_max_age: Duration,
    /// Optional wall-clock budget for a whole pipeline run, measured from the
    /// run's `started_at`.
    pub pipeline_deadline: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            dependency_max_age: Duration::from_secs(7200),
            pipeline_deadline: None,
        }
    }
}

/// Options for one engine invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Bypass dependency gating for every agent.
    pub force: bool,
    /// Resume this run instead of starting a new one.
    pub resume_run_id: Option<Uuid>,
}

/// Result of one engine invocation.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run: PipelineRun,
    /// Final per-agent record for the run, in execution order. Agents the
    /// engine never reached (shutdown mid-run) are absent.
    pub records: Vec<RunRecord>,
}

impl PipelineOutcome {
    pub fn status(&self) -> PipelineStatus {
        self.run.status
    }
}

/// Per-agent state reconstructed from a run's records.
#[derive(Debug, Default)]
struct AgentRunState {
    attempts_used: u32,
    terminal: Option<RunRecord>,
}

/// The execution engine: sole writer of the run state store.
pub struct PipelineExecutor<R: RunRepository> {
    repo: Arc<R>,
    runner: Arc<dyn AgentRunner>,
    registry: Arc<AgentRegistry>,
    resolver: DependencyResolver,
    store_retry: StoreRetryPolicy,
    config: ExecutorConfig,
    notifier: Option<Arc<FailureNotifier>>,
    shutdown: watch::Receiver<bool>,
    /// Serializes invocations for the same run id; distinct runs are
    /// independent.
    run_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<R: RunRepository> PipelineExecutor<R> {
    pub fn new(
        repo: Arc<R>,
        runner: Arc<dyn AgentRunner>,
        registry: Arc<AgentRegistry>,
        config: ExecutorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            repo,
            runner,
            registry,
            resolver: DependencyResolver::new(),
            store_retry: StoreRetryPolicy::default(),
            config,
            notifier: None,
            shutdown,
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<FailureNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_store_retry(mut self, policy: StoreRetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    /// Run the whole pipeline in dependency order.
    ///
    /// When `resume_run_id` names an open run (or one exists in the store),
    /// execution continues from the first agent that is not already
    /// terminal-successful; otherwise a fresh run starts.
    pub async fn run_pipeline(&self, opts: RunOptions) -> PipelineResult<PipelineOutcome> {
        let run = self.open_or_create_run(opts.resume_run_id).await?;
        let _guard = self.lock_run(run.id).await;

        info!(run_id = %run.id, force = opts.force, "starting pipeline run");

        let mut states = self.reload_states(run.id).await?;
        let order = self.resolver.execution_order(&self.registry);

        let mut skip_set: HashSet<String> = HashSet::new();
        for (agent, state) in &states {
            if let Some(record) = &state.terminal {
                if record.status.carries_error() {
                    skip_set.extend(self.resolver.transitive_dependents(&self.registry, agent));
                }
            }
        }

        let deadline = self
            .config
            .pipeline_deadline
            .map(|budget| {
                run.started_at
                    + chrono::Duration::from_std(budget).unwrap_or_else(|_| chrono::Duration::zero())
            });

        let mut interrupted = false;

        for agent_name in &order {
            if states
                .get(agent_name)
                .and_then(|s| s.terminal.as_ref())
                .is_some()
            {
                continue;
            }

            if *self.shutdown.borrow() {
                interrupted = true;
                break;
            }

            let descriptor = self.registry.get(agent_name)?.clone();

            if !opts.force && skip_set.contains(agent_name) {
                let record = self.append_skipped(run.id, agent_name).await?;
                info!(run_id = %run.id, agent = %agent_name, "skipped: upstream failure");
                states.entry(agent_name.clone()).or_default().terminal = Some(record);
                continue;
            }

            if deadline_exhausted(deadline) {
                let record = self.append_skipped(run.id, agent_name).await?;
                warn!(run_id = %run.id, agent = %agent_name, "skipped: pipeline deadline exhausted");
                states.entry(agent_name.clone()).or_default().terminal = Some(record);
                continue;
            }

            if !opts.force {
                let ctx = self.eligibility_context(run.id).await?;
                let unmet = self.resolver.unmet_dependencies(&descriptor, &ctx);
                if !unmet.is_empty() {
                    let record = self.append_skipped(run.id, agent_name).await?;
                    info!(
                        run_id = %run.id,
                        agent = %agent_name,
                        unmet = ?unmet,
                        "skipped: dependencies not met"
                    );
                    states.entry(agent_name.clone()).or_default().terminal = Some(record);
                    continue;
                }
            }

            let start_attempt = states
                .get(agent_name)
                .map_or(0, |s| s.attempts_used)
                .saturating_add(1);

            let record = self
                .execute_agent(&descriptor, run.id, start_attempt, deadline)
                .await?;

            if record.status.carries_error() {
                skip_set.extend(
                    self.resolver
                        .transitive_dependents(&self.registry, agent_name),
                );
                self.notify_failure(&record).await;
            }

            let cancelled = record
                .error_message
                .as_deref()
                .is_some_and(|m| m.contains("cancelled"));
            states.entry(agent_name.clone()).or_default().terminal = Some(record);
            if cancelled {
                interrupted = true;
                break;
            }
        }

        self.finalize_run(run, &order, states, interrupted).await
    }

    /// Run a single agent's attempt sequence, ignoring the pipeline-level
    /// aggregate. Dependencies are checked unless `force` is set.
    pub async fn run_single(&self, agent_name: &str, force: bool) -> PipelineResult<RunRecord> {
        let descriptor = self.registry.get(agent_name)?.clone();

        if !force {
            let ctx = self.eligibility_context(Uuid::nil()).await?;
            let unmet = self.resolver.unmet_dependencies(&descriptor, &ctx);
            if !unmet.is_empty() {
                return Err(PipelineError::DependencyNotMet {
                    agent: agent_name.to_string(),
                    unmet,
                });
            }
        }

        let run = PipelineRun::started();
        self.store_retry
            .execute("create_run", || async { self.repo.create_run(&run).await })
            .await?;
        let _guard = self.lock_run(run.id).await;

        info!(run_id = %run.id, agent = %agent_name, force, "starting single-agent run");

        let record = self.execute_agent(&descriptor, run.id, 1, None).await?;

        if record.status.carries_error() {
            self.notify_failure(&record).await;
        }

        let status = if record.status == RunStatus::Succeeded {
            PipelineStatus::Succeeded
        } else {
            PipelineStatus::Failed
        };
        self.store_retry
            .execute("finish_run", || async {
                self.repo.finish_run(run.id, status, Utc::now()).await
            })
            .await?;

        Ok(record)
    }

    /// One agent's full attempt sequence: backoff, timeout, persistence.
    /// Returns the terminal record for the run.
    async fn execute_agent(
        &self,
        descriptor: &AgentDescriptor,
        run_id: Uuid,
        start_attempt: u32,
        deadline: Option<DateTime<Utc>>,
    ) -> PipelineResult<RunRecord> {
        let max_attempts = descriptor.max_retries.max(start_attempt);
        let mut last_record: Option<RunRecord> = None;

        for attempt in start_attempt..=max_attempts {
            if attempt >= 2 {
                if deadline_exhausted(deadline) {
                    warn!(
                        run_id = %run_id,
                        agent = %descriptor.name,
                        "pipeline deadline exhausted, abandoning retry schedule"
                    );
                    break;
                }

                let delay = descriptor.backoff_delay(attempt);
                info!(
                    run_id = %run_id,
                    agent = %descriptor.name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                let mut shutdown = self.shutdown.clone();
                tokio::select! {
                    () = sleep(delay) => {}
                    _ = shutdown.changed() => break,
                }
            }

            let mut record = RunRecord::running(run_id, &descriptor.name, attempt);
            self.store_retry
                .execute("append", || {
                    let record = record.clone();
                    async move { self.repo.append(&record).await }
                })
                .await?;

            info!(
                run_id = %run_id,
                agent = %descriptor.name,
                attempt,
                timeout_secs = descriptor.timeout.as_secs(),
                "invoking agent"
            );

            let outcome = self
                .runner
                .run(&descriptor.command, descriptor.timeout, self.shutdown.clone())
                .await;

            let (status, message, stop) = match outcome {
                AgentOutcome::Success { .. } => (RunStatus::Succeeded, None, true),
                AgentOutcome::Failure { message } => (RunStatus::Failed, Some(message), false),
                AgentOutcome::TimedOut => (
                    RunStatus::TimedOut,
                    Some(format!(
                        "timed out after {} seconds",
                        descriptor.timeout.as_secs()
                    )),
                    false,
                ),
                AgentOutcome::Cancelled => (
                    RunStatus::Failed,
                    Some("attempt cancelled by shutdown".to_string()),
                    true,
                ),
            };

            record
                .finish(status, message)
                .map_err(PipelineError::InvalidTransition)?;
            // The unit of work only counts once its outcome is durable.
            self.store_retry
                .execute("mark_terminal", || {
                    let record = record.clone();
                    async move { self.repo.mark_terminal(&record).await }
                })
                .await?;

            match status {
                RunStatus::Succeeded => {
                    info!(
                        run_id = %run_id,
                        agent = %descriptor.name,
                        attempt,
                        duration_ms = record.duration_ms.unwrap_or(0),
                        "agent succeeded"
                    );
                }
                _ => {
                    error!(
                        run_id = %run_id,
                        agent = %descriptor.name,
                        attempt,
                        status = %record.status,
                        error = record.error_message.as_deref().unwrap_or(""),
                        "agent attempt failed"
                    );
                }
            }

            last_record = Some(record);
            if stop {
                break;
            }
        }

        // The loop always runs at least once, so a record exists.
        last_record.ok_or_else(|| {
            PipelineError::InvalidTransition(format!(
                "agent {} produced no attempt record",
                descriptor.name
            ))
        })
    }

    /// Resume target: the caller's run id, else the most recent open run,
    /// else a fresh run.
    async fn open_or_create_run(&self, resume: Option<Uuid>) -> PipelineResult<PipelineRun> {
        if let Some(run_id) = resume {
            return match self.repo.get_run(run_id).await? {
                Some(run) if run.status == PipelineStatus::Running => Ok(run),
                Some(run) => Err(PipelineError::InvalidTransition(format!(
                    "run {run_id} is already terminal ({})",
                    run.status
                ))),
                None => Err(PipelineError::RunNotFound(run_id)),
            };
        }

        if let Some(open) = self.repo.open_runs().await?.into_iter().next_back() {
            info!(run_id = %open.id, "resuming open pipeline run");
            return Ok(open);
        }

        let run = PipelineRun::started();
        self.store_retry
            .execute("create_run", || async { self.repo.create_run(&run).await })
            .await?;
        Ok(run)
    }

    /// Rebuild per-agent state from a run's records, terminalizing any
    /// attempt left Running by a crash.
    async fn reload_states(&self, run_id: Uuid) -> PipelineResult<HashMap<String, AgentRunState>> {
        let records = self.repo.load(run_id).await?;
        let mut states: HashMap<String, AgentRunState> = HashMap::new();

        for record in records {
            let state = states.entry(record.agent_name.clone()).or_default();
            if record.attempt > state.attempts_used {
                state.attempts_used = record.attempt;
            }

            match record.status {
                RunStatus::Running | RunStatus::Pending => {
                    // Aborted by a crash: counts toward the attempt budget.
                    let mut aborted = record.clone();
                    aborted
                        .finish(
                            RunStatus::Failed,
                            Some("attempt aborted by process restart".to_string()),
                        )
                        .map_err(PipelineError::InvalidTransition)?;
                    warn!(
                        run_id = %run_id,
                        agent = %record.agent_name,
                        attempt = record.attempt,
                        "terminalizing attempt left running by a previous process"
                    );
                    self.store_retry
                        .execute("mark_terminal", || {
                            let aborted = aborted.clone();
                            async move { self.repo.mark_terminal(&aborted).await }
                        })
                        .await?;
                    // Only a terminal Failed at the retry cap ends the agent.
                    if aborted.attempt >= self.registry.get(&aborted.agent_name)?.max_retries {
                        state.terminal = Some(aborted);
                    }
                }
                RunStatus::Succeeded | RunStatus::Skipped => {
                    state.terminal = Some(record);
                }
                RunStatus::Failed | RunStatus::TimedOut => {
                    let cap = self.registry.get(&record.agent_name)?.max_retries;
                    let cancelled = record
                        .error_message
                        .as_deref()
                        .is_some_and(|m| m.contains("cancelled"));
                    if record.attempt >= cap || cancelled {
                        state.terminal = Some(record);
                    }
                }
            }
        }

        Ok(states)
    }

    async fn eligibility_context(&self, run_id: Uuid) -> PipelineResult<EligibilityContext> {
        let mut ctx = EligibilityContext::new(self.config.dependency_max_age);

        let successes = future::try_join_all(self.registry.list().iter().map(|agent| async move {
            let success = self.repo.latest_success(&agent.name).await?;
            Ok::<_, PipelineError>((agent.name.clone(), success))
        }))
        .await?;
        for (name, success) in successes {
            if let Some(at) = success.and_then(|record| record.finished_at) {
                ctx.last_success.insert(name, at);
            }
        }

        if !run_id.is_nil() {
            for record in self.repo.load(run_id).await? {
                if record.status == RunStatus::Running {
                    ctx.running.insert(record.agent_name);
                }
            }
        }

        Ok(ctx)
    }

    async fn append_skipped(&self, run_id: Uuid, agent_name: &str) -> PipelineResult<RunRecord> {
        let record = RunRecord::skipped(run_id, agent_name);
        self.store_retry
            .execute("append", || {
                let record = record.clone();
                async move { self.repo.append(&record).await }
            })
            .await?;
        Ok(record)
    }

    async fn finalize_run(
        &self,
        mut run: PipelineRun,
        order: &[String],
        states: HashMap<String, AgentRunState>,
        interrupted: bool,
    ) -> PipelineResult<PipelineOutcome> {
        let records: Vec<RunRecord> = order
            .iter()
            .filter_map(|name| states.get(name).and_then(|s| s.terminal.clone()))
            .collect();

        let statuses: Vec<RunStatus> = records.iter().map(|r| r.status).collect();
        let complete = records.len() == order.len();

        let status = if interrupted && !complete {
            // Shutdown mid-run: leave the run open for a later resume.
            PipelineStatus::Running
        } else {
            overall_status(statuses.iter())
        };

        run.status = status;
        if status.is_terminal() {
            let finished_at = Utc::now();
            run.finished_at = Some(finished_at);
            self.store_retry
                .execute("finish_run", || async {
                    self.repo.finish_run(run.id, status, finished_at).await
                })
                .await?;
        }

        info!(run_id = %run.id, status = %status, "pipeline run finished");
        Ok(PipelineOutcome { run, records })
    }

    async fn notify_failure(&self, record: &RunRecord) {
        if let Some(notifier) = &self.notifier {
            notifier
                .notify_failure(
                    &record.agent_name,
                    record.error_message.as_deref().unwrap_or("unknown error"),
                )
                .await;
        }
    }

    async fn lock_run(&self, run_id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.run_locks.lock().await;
            locks
                .entry(run_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

fn deadline_exhausted(deadline: Option<DateTime<Utc>>) -> bool {
    deadline.is_some_and(|d| Utc::now() >= d)
}
