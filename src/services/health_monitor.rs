//! Health monitoring for the analysis pipeline.
//!
//! Purely observational: derives snapshots from run records on demand and
//! never mutates them or triggers retries. Rates are windowed over the most
//! recent terminal attempts; staleness is judged against twice the agent's
//! schedule interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::domain::errors::PipelineResult;
use crate::domain::models::{AgentHealth, HealthConfig, HealthSnapshot, RunStatus};
use crate::domain::ports::RunRepository;
use crate::services::registry::AgentRegistry;

/// Fraction of agents that must be healthy for the pipeline to be healthy.
const OVERALL_HEALTHY_FRACTION: f64 = 0.75;

pub struct HealthMonitor<R: RunRepository> {
    repo: Arc<R>,
    registry: Arc<AgentRegistry>,
    config: HealthConfig,
}

impl<R: RunRepository + 'static> HealthMonitor<R> {
    pub fn new(repo: Arc<R>, registry: Arc<AgentRegistry>, config: HealthConfig) -> Self {
        Self {
            repo,
            registry,
            config,
        }
    }

    /// Point-in-time snapshot, recomputed from the store on every call.
    pub async fn check(&self) -> PipelineResult<HealthSnapshot> {
        let now = Utc::now();
        let running = self.repo.running_agents().await?;

        let mut agents = Vec::with_capacity(self.registry.list().len());
        for descriptor in self.registry.list() {
            let window = self
                .repo
                .recent_terminal(&descriptor.name, self.config.window_runs)
                .await?;

            // Skipped records are terminal but not attempts; they carry no
            // signal about the agent itself.
            let attempts: Vec<_> = window
                .iter()
                .filter(|r| r.status != RunStatus::Skipped)
                .collect();

            let total_runs = attempts.len() as u64;
            let success_count = attempts
                .iter()
                .filter(|r| r.status == RunStatus::Succeeded)
                .count() as u64;
            let error_count = total_runs - success_count;

            let (success_rate, error_rate) = if total_runs > 0 {
                (
                    success_count as f64 / total_runs as f64,
                    error_count as f64 / total_runs as f64,
                )
            } else {
                (0.0, 0.0)
            };

            let last_success = self
                .repo
                .latest_success(&descriptor.name)
                .await?
                .and_then(|r| r.finished_at);
            let seconds_since_success = last_success.map(|at| (now - at).num_seconds());

            let stale = match seconds_since_success {
                Some(secs) => secs > 2 * descriptor.schedule_interval.as_secs() as i64,
                None => true,
            };

            let durations: Vec<i64> = attempts
                .iter()
                .filter(|r| r.status == RunStatus::Succeeded)
                .filter_map(|r| r.duration_ms)
                .collect();
            let avg_duration_ms = if durations.is_empty() {
                None
            } else {
                Some(durations.iter().sum::<i64>() / durations.len() as i64)
            };

            let healthy = error_rate <= self.config.max_error_rate
                && success_rate >= self.config.min_success_rate
                && !stale;

            agents.push(AgentHealth {
                agent: descriptor.name.clone(),
                healthy,
                total_runs,
                success_count,
                error_count,
                success_rate,
                error_rate,
                last_success,
                seconds_since_success,
                stale,
                currently_running: running.contains(&descriptor.name),
                avg_duration_ms,
            });
        }

        let total_agents = agents.len();
        let healthy_agents = agents.iter().filter(|a| a.healthy).count();
        let health_fraction = if total_agents > 0 {
            healthy_agents as f64 / total_agents as f64
        } else {
            0.0
        };

        Ok(HealthSnapshot {
            timestamp: now,
            overall_healthy: health_fraction >= OVERALL_HEALTHY_FRACTION,
            health_percentage: health_fraction * 100.0,
            healthy_agents,
            total_agents,
            agents,
            currently_running: running,
        })
    }

    /// Continuously refreshing view: a snapshot per tick until the shutdown
    /// signal arrives or the receiver is dropped. The first snapshot is
    /// emitted immediately.
    pub fn watch(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> mpsc::Receiver<HealthSnapshot> {
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            info!(interval_secs = interval.as_secs(), "health monitor started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.check().await {
                            Ok(snapshot) => {
                                if tx.send(snapshot).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                debug!(error = %err, "health check failed, retrying next tick");
                            }
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }

            info!("health monitor stopped");
        });

        rx
    }
}
