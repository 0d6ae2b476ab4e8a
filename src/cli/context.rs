//! Shared bootstrap for CLI commands.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::adapters::process::ProcessAgentRunner;
use crate::adapters::sqlite::{create_pool, run_migrations, PoolConfig, SqliteRunRepository};
use crate::domain::models::Config;
use crate::services::{
    AgentRegistry, ExecutorConfig, FailureNotifier, HealthMonitor, PipelineExecutor,
    StoreRetryPolicy,
};

/// Wired-up services shared by every command.
pub struct AppContext {
    pub config: Config,
    pub repo: Arc<SqliteRunRepository>,
    pub registry: Arc<AgentRegistry>,
}

impl AppContext {
    /// Open the database, apply migrations, and validate the registry.
    pub async fn init(config: Config) -> Result<Self> {
        let registry = Arc::new(
            AgentRegistry::from_config(&config).context("Invalid agent configuration")?,
        );

        let database_url = format!("sqlite://{}", config.database.path);
        let pool = create_pool(
            &database_url,
            Some(PoolConfig {
                max_connections: config.database.max_connections,
                ..Default::default()
            }),
        )
        .await
        .context("Failed to open run state database")?;
        run_migrations(&pool)
            .await
            .context("Failed to apply database migrations")?;

        Ok(Self {
            config,
            repo: Arc::new(SqliteRunRepository::new(pool)),
            registry,
        })
    }

    /// Build the execution engine. The shutdown receiver cancels in-flight
    /// attempts and stops retry schedules.
    pub fn executor(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> PipelineExecutor<SqliteRunRepository> {
        let executor_config = ExecutorConfig {
            dependency_max_age: Duration::from_secs(self.config.dependency_max_age_seconds),
            pipeline_deadline: self.config.pipeline_deadline_seconds.map(Duration::from_secs),
        };

        let mut executor = PipelineExecutor::new(
            self.repo.clone(),
            Arc::new(ProcessAgentRunner::new()),
            self.registry.clone(),
            executor_config,
            shutdown,
        )
        .with_store_retry(StoreRetryPolicy::from_config(&self.config.store_retry));

        if !self.config.notification_webhooks.is_empty() {
            executor = executor.with_notifier(Arc::new(FailureNotifier::new(
                self.config.notification_webhooks.clone(),
            )));
        }

        executor
    }

    pub fn monitor(&self) -> HealthMonitor<SqliteRunRepository> {
        HealthMonitor::new(
            self.repo.clone(),
            self.registry.clone(),
            self.config.health.clone(),
        )
    }
}

/// Shutdown channel wired to ctrl-c.
pub fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupt received, cancelling in-flight work");
                let _ = tx.send(true);
            }
            Err(err) => tracing::warn!(error = %err, "failed to install interrupt handler"),
        }
        // Keep the sender alive: a dropped sender reads as a change and
        // would cancel in-flight attempts.
        std::future::pending::<()>().await;
    });
    rx
}
