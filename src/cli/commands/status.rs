//! `status` command: most recent pipeline run plus current health.

use std::process::ExitCode;

use anyhow::Result;

use crate::cli::context::AppContext;
use crate::cli::output::{format_health_table, format_run_records};
use crate::domain::ports::RunRepository;

pub async fn execute(ctx: &AppContext, json: bool) -> Result<ExitCode> {
    let latest = ctx.repo.latest_run().await?;
    let records = match &latest {
        Some(run) => ctx.repo.load(run.id).await?,
        None => vec![],
    };
    let snapshot = ctx.monitor().check().await?;

    if json {
        let payload = serde_json::json!({
            "latest_run": latest,
            "records": records,
            "health": snapshot,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(ExitCode::SUCCESS);
    }

    match &latest {
        Some(run) => {
            println!("Latest pipeline run: {} ({})", run.id, run.status);
            println!("  Started:  {}", run.started_at.to_rfc3339());
            if let Some(finished) = run.finished_at {
                println!("  Finished: {}", finished.to_rfc3339());
            }
            if !records.is_empty() {
                println!("{}", format_run_records(&records));
            }
        }
        None => println!("No pipeline runs recorded yet."),
    }

    println!();
    println!(
        "Health: {:.0}% ({}/{} agents healthy)",
        snapshot.health_percentage, snapshot.healthy_agents, snapshot.total_agents
    );
    println!("{}", format_health_table(&snapshot));

    Ok(ExitCode::SUCCESS)
}
