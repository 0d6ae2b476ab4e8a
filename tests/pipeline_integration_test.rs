//! End-to-end tests of the execution engine against the SQLite store and the
//! mock agent runner.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use argus::adapters::process::MockOutcome;
use argus::domain::errors::PipelineError;
use argus::domain::models::{PipelineRun, PipelineStatus, RunRecord, RunStatus};
use argus::domain::ports::RunRepository;
use argus::services::{ExecutorConfig, PipelineExecutor, RunOptions, StoreRetryPolicy};
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use common::{harness, test_registry, test_repo};

const CHAIN: [&str; 4] = [
    "pattern_recognition",
    "business_intelligence",
    "ab_testing",
    "insights_engine",
];

#[tokio::test]
async fn test_happy_path_runs_chain_in_declared_order() {
    let h = harness().await;

    let outcome = h.executor.run_pipeline(RunOptions::default()).await.unwrap();

    assert_eq!(outcome.status(), PipelineStatus::Succeeded);
    assert_eq!(outcome.records.len(), 4);
    for (record, expected) in outcome.records.iter().zip(CHAIN) {
        assert_eq!(record.agent_name, expected);
        assert_eq!(record.status, RunStatus::Succeeded);
        assert_eq!(record.attempt, 1);
    }

    assert_eq!(h.runner.invocations().await, CHAIN.map(String::from).to_vec());

    // Exactly one record per agent, none left Running.
    let records = h.repo.load(outcome.run.id).await.unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.status == RunStatus::Succeeded));

    let run = h.repo.get_run(outcome.run.id).await.unwrap().unwrap();
    assert_eq!(run.status, PipelineStatus::Succeeded);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_always_failing_agent_exhausts_retries_and_propagates_skip() {
    let h = harness().await;
    h.runner
        .script(
            "pattern_recognition",
            vec![
                MockOutcome::fail("exit code 1"),
                MockOutcome::fail("exit code 1"),
                MockOutcome::fail("exit code 1"),
            ],
        )
        .await;

    let outcome = h.executor.run_pipeline(RunOptions::default()).await.unwrap();

    // First agent failed terminally: nothing downstream ran.
    assert_eq!(outcome.status(), PipelineStatus::Failed);
    assert_eq!(h.runner.invocation_count("pattern_recognition").await, 3);
    for dependent in &CHAIN[1..] {
        assert_eq!(h.runner.invocation_count(dependent).await, 0);
    }

    let records = h.repo.load(outcome.run.id).await.unwrap();
    let failures: Vec<&RunRecord> = records
        .iter()
        .filter(|r| r.agent_name == "pattern_recognition")
        .collect();
    assert_eq!(failures.len(), 3);
    for (i, record) in failures.iter().enumerate() {
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.attempt, i as u32 + 1);
        assert_eq!(record.error_message.as_deref(), Some("exit code 1"));
    }

    // Inter-attempt delay is monotonically non-decreasing per the backoff
    // schedule (base 40ms, factor 2).
    let gap1 = failures[1].started_at - failures[0].started_at;
    let gap2 = failures[2].started_at - failures[1].started_at;
    assert!(gap1 >= ChronoDuration::milliseconds(35), "gap1 = {gap1}");
    assert!(gap2 >= gap1 - ChronoDuration::milliseconds(10), "{gap1} then {gap2}");

    // Dependents are terminal Skipped with no attempt and no error.
    for dependent in &CHAIN[1..] {
        let record = records
            .iter()
            .find(|r| &r.agent_name == dependent)
            .unwrap();
        assert_eq!(record.status, RunStatus::Skipped);
        assert_eq!(record.attempt, 0);
        assert!(record.error_message.is_none());
    }
}

#[tokio::test]
async fn test_mid_chain_failure_yields_partial_failure() {
    let h = harness().await;
    h.runner
        .script(
            "business_intelligence",
            vec![
                MockOutcome::fail("bad query"),
                MockOutcome::fail("bad query"),
                MockOutcome::fail("bad query"),
            ],
        )
        .await;

    let outcome = h.executor.run_pipeline(RunOptions::default()).await.unwrap();

    assert_eq!(outcome.status(), PipelineStatus::PartiallyFailed);

    let by_agent: HashMap<&str, RunStatus> = outcome
        .records
        .iter()
        .map(|r| (r.agent_name.as_str(), r.status))
        .collect();
    assert_eq!(by_agent["pattern_recognition"], RunStatus::Succeeded);
    assert_eq!(by_agent["business_intelligence"], RunStatus::Failed);
    assert_eq!(by_agent["ab_testing"], RunStatus::Skipped);
    assert_eq!(by_agent["insights_engine"], RunStatus::Skipped);

    assert_eq!(h.runner.invocation_count("ab_testing").await, 0);
    assert_eq!(h.runner.invocation_count("insights_engine").await, 0);
}

#[tokio::test]
async fn test_retry_recovers_after_transient_failure() {
    let h = harness().await;
    h.runner
        .script(
            "business_intelligence",
            vec![MockOutcome::fail("transient"), MockOutcome::succeed()],
        )
        .await;

    let outcome = h.executor.run_pipeline(RunOptions::default()).await.unwrap();

    assert_eq!(outcome.status(), PipelineStatus::Succeeded);
    assert_eq!(h.runner.invocation_count("business_intelligence").await, 2);

    let record = outcome
        .records
        .iter()
        .find(|r| r.agent_name == "business_intelligence")
        .unwrap();
    assert_eq!(record.status, RunStatus::Succeeded);
    assert_eq!(record.attempt, 2);
}

#[tokio::test]
async fn test_hanging_agent_times_out_per_attempt() {
    let h = harness().await;
    // ab_testing has max_retries = 2 in the test registry.
    h.runner
        .script("ab_testing", vec![MockOutcome::Hang, MockOutcome::Hang])
        .await;

    let outcome = h.executor.run_pipeline(RunOptions::default()).await.unwrap();

    assert_eq!(outcome.status(), PipelineStatus::PartiallyFailed);

    let records = h.repo.load(outcome.run.id).await.unwrap();
    let timeouts: Vec<&RunRecord> = records
        .iter()
        .filter(|r| r.agent_name == "ab_testing")
        .collect();
    assert_eq!(timeouts.len(), 2);
    for record in &timeouts {
        assert_eq!(record.status, RunStatus::TimedOut);
        assert!(record
            .error_message
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }

    let insights = records
        .iter()
        .find(|r| r.agent_name == "insights_engine")
        .unwrap();
    assert_eq!(insights.status, RunStatus::Skipped);
}

#[tokio::test]
async fn test_force_invokes_every_agent_and_still_retries() {
    let h = harness().await;
    // No prior successes anywhere, so without force only the root would run
    // after a failure. Script the root to fail terminally.
    h.runner
        .script(
            "pattern_recognition",
            vec![
                MockOutcome::fail("down"),
                MockOutcome::fail("down"),
                MockOutcome::fail("down"),
            ],
        )
        .await;
    h.runner
        .script(
            "business_intelligence",
            vec![MockOutcome::fail("transient"), MockOutcome::succeed()],
        )
        .await;

    let outcome = h
        .executor
        .run_pipeline(RunOptions {
            force: true,
            resume_run_id: None,
        })
        .await
        .unwrap();

    // Every agent was invoked regardless of the root failure...
    assert_eq!(h.runner.invocation_count("pattern_recognition").await, 3);
    assert_eq!(h.runner.invocation_count("business_intelligence").await, 2);
    assert_eq!(h.runner.invocation_count("ab_testing").await, 1);
    assert_eq!(h.runner.invocation_count("insights_engine").await, 1);

    // ...and timeout/retry policies still applied.
    assert_eq!(outcome.status(), PipelineStatus::PartiallyFailed);
    let by_agent: HashMap<&str, RunStatus> = outcome
        .records
        .iter()
        .map(|r| (r.agent_name.as_str(), r.status))
        .collect();
    assert_eq!(by_agent["pattern_recognition"], RunStatus::Failed);
    assert_eq!(by_agent["business_intelligence"], RunStatus::Succeeded);
}

#[tokio::test]
async fn test_resume_after_crash_skips_succeeded_and_reattempts_running() {
    let h = harness().await;

    // Simulate a crashed run: agent 1 succeeded, agent 2 left Running.
    let run = PipelineRun::started();
    h.repo.create_run(&run).await.unwrap();

    let mut succeeded = RunRecord::running(run.id, "pattern_recognition", 1);
    h.repo.append(&succeeded).await.unwrap();
    succeeded.finish(RunStatus::Succeeded, None).unwrap();
    h.repo.mark_terminal(&succeeded).await.unwrap();

    let lingering = RunRecord::running(run.id, "business_intelligence", 1);
    h.repo.append(&lingering).await.unwrap();

    let outcome = h
        .executor
        .run_pipeline(RunOptions {
            force: false,
            resume_run_id: Some(run.id),
        })
        .await
        .unwrap();

    // Agent 1 must not be re-invoked; agent 2 is re-attempted as attempt 2.
    assert_eq!(h.runner.invocation_count("pattern_recognition").await, 0);
    assert_eq!(h.runner.invocation_count("business_intelligence").await, 1);

    let records = h.repo.load(run.id).await.unwrap();
    assert!(records.iter().all(|r| r.status != RunStatus::Running));

    let aborted = records.iter().find(|r| r.id == lingering.id).unwrap();
    assert_eq!(aborted.status, RunStatus::Failed);
    assert!(aborted
        .error_message
        .as_deref()
        .unwrap()
        .contains("aborted by process restart"));

    let retried = records
        .iter()
        .find(|r| r.agent_name == "business_intelligence" && r.attempt == 2)
        .unwrap();
    assert_eq!(retried.status, RunStatus::Succeeded);

    assert_eq!(outcome.status(), PipelineStatus::Succeeded);
}

#[tokio::test]
async fn test_run_all_auto_resumes_open_run() {
    let h = harness().await;

    let run = PipelineRun::started();
    h.repo.create_run(&run).await.unwrap();
    let mut succeeded = RunRecord::running(run.id, "pattern_recognition", 1);
    h.repo.append(&succeeded).await.unwrap();
    succeeded.finish(RunStatus::Succeeded, None).unwrap();
    h.repo.mark_terminal(&succeeded).await.unwrap();

    let outcome = h.executor.run_pipeline(RunOptions::default()).await.unwrap();

    // The open run was resumed, not restarted.
    assert_eq!(outcome.run.id, run.id);
    assert_eq!(h.runner.invocation_count("pattern_recognition").await, 0);
    assert_eq!(outcome.status(), PipelineStatus::Succeeded);
}

#[tokio::test]
async fn test_concurrent_invocations_for_same_run_are_serialized() {
    let h = harness().await;

    let run = PipelineRun::started();
    h.repo.create_run(&run).await.unwrap();

    let executor = Arc::new(h.executor);
    let opts = RunOptions {
        force: false,
        resume_run_id: Some(run.id),
    };

    let first = {
        let executor = executor.clone();
        let opts = opts.clone();
        tokio::spawn(async move { executor.run_pipeline(opts).await })
    };
    let second = {
        let executor = executor.clone();
        let opts = opts.clone();
        tokio::spawn(async move { executor.run_pipeline(opts).await })
    };

    let _ = first.await.unwrap();
    let _ = second.await.unwrap();

    // Serialization means no agent ran twice for the run.
    for agent in CHAIN {
        assert_eq!(h.runner.invocation_count(agent).await, 1, "{agent}");
    }
    let records = h.repo.load(run.id).await.unwrap();
    assert_eq!(records.len(), 4);
}

#[tokio::test]
async fn test_run_single_checks_dependencies_unless_forced() {
    let h = harness().await;

    let err = h
        .executor
        .run_single("business_intelligence", false)
        .await
        .unwrap_err();
    match err {
        PipelineError::DependencyNotMet { agent, unmet } => {
            assert_eq!(agent, "business_intelligence");
            assert_eq!(unmet, vec!["pattern_recognition".to_string()]);
        }
        other => panic!("expected DependencyNotMet, got {other:?}"),
    }
    assert_eq!(h.runner.invocation_count("business_intelligence").await, 0);

    let record = h
        .executor
        .run_single("business_intelligence", true)
        .await
        .unwrap();
    assert_eq!(record.status, RunStatus::Succeeded);
    assert_eq!(record.attempt, 1);
}

#[tokio::test]
async fn test_run_single_with_fresh_dependency_success() {
    let h = harness().await;

    let record = h
        .executor
        .run_single("pattern_recognition", false)
        .await
        .unwrap();
    assert_eq!(record.status, RunStatus::Succeeded);

    // The recorded success now satisfies the dependent's gating.
    let record = h
        .executor
        .run_single("business_intelligence", false)
        .await
        .unwrap();
    assert_eq!(record.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_stale_dependency_success_skips_agent() {
    let h = harness().await;

    // A success older than the freshness window (2h default).
    let old_run = PipelineRun::started();
    h.repo.create_run(&old_run).await.unwrap();
    let old_finish = Utc::now() - ChronoDuration::hours(3);
    let stale = RunRecord {
        id: Uuid::new_v4(),
        run_id: old_run.id,
        agent_name: "pattern_recognition".to_string(),
        status: RunStatus::Succeeded,
        attempt: 1,
        started_at: old_finish - ChronoDuration::seconds(30),
        finished_at: Some(old_finish),
        duration_ms: Some(30_000),
        error_message: None,
    };
    h.repo.append(&stale).await.unwrap();
    h.repo
        .finish_run(old_run.id, PipelineStatus::Succeeded, old_finish)
        .await
        .unwrap();

    let err = h
        .executor
        .run_single("business_intelligence", false)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::DependencyNotMet { .. }));
}

#[tokio::test]
async fn test_shutdown_cancels_attempt_and_leaves_run_open() {
    let h = harness().await;
    h.runner
        .script("pattern_recognition", vec![MockOutcome::Hang])
        .await;

    let shutdown_tx = h.shutdown_tx;
    let repo = h.repo.clone();
    let runner = h.runner.clone();
    let executor = Arc::new(h.executor);

    let task = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.run_pipeline(RunOptions::default()).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    let outcome = task.await.unwrap().unwrap();

    // The in-flight attempt was recorded as a cancelled failure and nothing
    // downstream was scheduled.
    assert_eq!(outcome.status(), PipelineStatus::Running);
    assert_eq!(runner.invocation_count("business_intelligence").await, 0);

    let records = repo.load(outcome.run.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RunStatus::Failed);
    assert!(records[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("cancelled"));

    // The run stays open for resume.
    let open = repo.open_runs().await.unwrap();
    assert_eq!(open.len(), 1);

    // Resuming completes the run: the cancelled agent is terminal for this
    // run, so its dependents are skipped.
    shutdown_tx.send(false).unwrap();
    let outcome = executor.run_pipeline(RunOptions::default()).await.unwrap();
    assert_eq!(outcome.status(), PipelineStatus::Failed);
    assert!(outcome
        .records
        .iter()
        .skip(1)
        .all(|r| r.status == RunStatus::Skipped));
}

#[tokio::test]
async fn test_pipeline_deadline_skips_remaining_agents() {
    let repo = test_repo().await;
    let runner = Arc::new(argus::adapters::process::MockAgentRunner::new());
    let (_tx, rx) = watch::channel(false);

    let executor = PipelineExecutor::new(
        repo.clone(),
        runner.clone(),
        test_registry(),
        ExecutorConfig {
            dependency_max_age: Duration::from_secs(7200),
            pipeline_deadline: Some(Duration::from_secs(60)),
        },
        rx,
    )
    .with_store_retry(StoreRetryPolicy::new(2, Duration::from_millis(1)));

    // An open run that started well past its budget: resuming it must not
    // invoke anything.
    let mut run = PipelineRun::started();
    run.started_at = Utc::now() - ChronoDuration::hours(1);
    repo.create_run(&run).await.unwrap();

    let outcome = executor
        .run_pipeline(RunOptions {
            force: false,
            resume_run_id: Some(run.id),
        })
        .await
        .unwrap();

    // Budget was exhausted before anything ran.
    assert_eq!(outcome.status(), PipelineStatus::Failed);
    assert!(outcome.records.iter().all(|r| r.status == RunStatus::Skipped));
    assert!(runner.invocations().await.is_empty());
}
