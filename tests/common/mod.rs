//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use argus::adapters::process::MockAgentRunner;
use argus::adapters::sqlite::{create_test_pool, SqliteRunRepository};
use argus::domain::models::{AgentCommand, AgentDescriptor};
use argus::services::{AgentRegistry, ExecutorConfig, PipelineExecutor, StoreRetryPolicy};

/// The four-agent linear chain with fast policies for testing. Commands use
/// the agent name as the program so the mock runner can script per-agent
/// outcomes.
pub fn test_registry() -> Arc<AgentRegistry> {
    Arc::new(
        AgentRegistry::from_descriptors(vec![
            test_descriptor("pattern_recognition", &[], 3),
            test_descriptor("business_intelligence", &["pattern_recognition"], 3),
            test_descriptor("ab_testing", &["business_intelligence"], 2),
            test_descriptor(
                "insights_engine",
                &["pattern_recognition", "business_intelligence", "ab_testing"],
                3,
            ),
        ])
        .unwrap(),
    )
}

pub fn test_descriptor(name: &str, deps: &[&str], max_retries: u32) -> AgentDescriptor {
    AgentDescriptor {
        name: name.to_string(),
        command: AgentCommand::new(name, vec![]),
        dependencies: deps.iter().map(ToString::to_string).collect(),
        timeout: Duration::from_millis(200),
        max_retries,
        backoff_base: Duration::from_millis(40),
        backoff_factor: 2.0,
        schedule_interval: Duration::from_secs(900),
    }
}

pub async fn test_repo() -> Arc<SqliteRunRepository> {
    let pool = create_test_pool().await.unwrap();
    Arc::new(SqliteRunRepository::new(pool))
}

pub struct TestHarness {
    pub repo: Arc<SqliteRunRepository>,
    pub runner: Arc<MockAgentRunner>,
    pub executor: PipelineExecutor<SqliteRunRepository>,
    pub shutdown_tx: watch::Sender<bool>,
}

pub async fn harness() -> TestHarness {
    harness_with_registry(test_registry()).await
}

pub async fn harness_with_registry(registry: Arc<AgentRegistry>) -> TestHarness {
    let repo = test_repo().await;
    let runner = Arc::new(MockAgentRunner::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let executor = PipelineExecutor::new(
        repo.clone(),
        runner.clone(),
        registry,
        ExecutorConfig::default(),
        shutdown_rx,
    )
    .with_store_retry(StoreRetryPolicy::new(2, Duration::from_millis(1)));

    TestHarness {
        repo,
        runner,
        executor,
        shutdown_tx,
    }
}
