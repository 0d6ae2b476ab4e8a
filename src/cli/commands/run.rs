//! `run-all` and `run-agent` commands.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::context::{shutdown_channel, AppContext};
use crate::cli::output::format_run_records;
use crate::domain::errors::PipelineError;
use crate::domain::models::{PipelineStatus, RunStatus};
use crate::services::RunOptions;

fn pipeline_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Run the whole pipeline in dependency order. Exit code 0 only on full
/// success.
pub async fn run_all(ctx: &AppContext, force: bool, json: bool) -> Result<ExitCode> {
    let executor = ctx.executor(shutdown_channel());

    let spinner = (!json).then(|| pipeline_spinner("Running analysis pipeline...".to_string()));
    let outcome = executor
        .run_pipeline(RunOptions {
            force,
            resume_run_id: None,
        })
        .await?;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if json {
        let payload = serde_json::json!({
            "run_id": outcome.run.id,
            "status": outcome.run.status,
            "started_at": outcome.run.started_at,
            "finished_at": outcome.run.finished_at,
            "agents": outcome.records,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Pipeline run {}", outcome.run.id);
        println!("{}", format_run_records(&outcome.records));
        println!("Overall status: {}", outcome.run.status);
    }

    Ok(exit_code_for(outcome.status()))
}

/// Run a single agent's attempt sequence. An unmet dependency is a skip, not
/// a failure.
pub async fn run_agent(ctx: &AppContext, agent: &str, force: bool, json: bool) -> Result<ExitCode> {
    let executor = ctx.executor(shutdown_channel());

    let spinner = (!json).then(|| pipeline_spinner(format!("Running agent {agent}...")));
    let result = executor.run_single(agent, force).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match result {
        Ok(record) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}", format_run_records(std::slice::from_ref(&record)));
            }
            let code = if record.status == RunStatus::Succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
            Ok(code)
        }
        Err(PipelineError::DependencyNotMet { agent, unmet }) => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "agent": agent,
                        "status": "skipped",
                        "reason": "dependencies_not_met",
                        "unmet": unmet,
                    }))?
                );
            } else {
                println!("Agent {agent} skipped: dependencies not met ({})", unmet.join(", "));
                println!("Use --force to run anyway.");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Err(err.into()),
    }
}

fn exit_code_for(status: PipelineStatus) -> ExitCode {
    if status == PipelineStatus::Succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
