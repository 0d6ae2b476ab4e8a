//! `monitor` and `health-check` commands.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use console::style;
use tokio::sync::broadcast;

use crate::cli::context::AppContext;
use crate::cli::output::format_health_table;
use crate::domain::models::HealthSnapshot;

/// Single point-in-time health check. Exit code reflects overall health.
pub async fn health_check(ctx: &AppContext, json: bool) -> Result<ExitCode> {
    let snapshot = ctx.monitor().check().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_dashboard(&snapshot);
    }

    let code = if snapshot.overall_healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    };
    Ok(code)
}

/// Continuously refreshing dashboard until ctrl-c.
pub async fn monitor(ctx: &AppContext, interval_secs: u64, json: bool) -> Result<ExitCode> {
    let monitor = Arc::new(ctx.monitor());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    let mut snapshots = monitor.watch(Duration::from_secs(interval_secs.max(1)), shutdown_rx);

    if !json {
        println!(
            "Monitoring pipeline health every {interval_secs}s. Press ctrl-c to stop."
        );
    }

    while let Some(snapshot) = snapshots.recv().await {
        if json {
            println!("{}", serde_json::to_string(&snapshot)?);
        } else {
            let term = console::Term::stdout();
            let _ = term.clear_screen();
            print_dashboard(&snapshot);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_dashboard(snapshot: &HealthSnapshot) {
    let overall = if snapshot.overall_healthy {
        style("HEALTHY").green().bold()
    } else {
        style("UNHEALTHY").red().bold()
    };

    println!("{}", style("ARGUS PIPELINE HEALTH").bold());
    println!("  Updated: {}", snapshot.timestamp.to_rfc3339());
    println!(
        "  Overall: {overall} ({:.0}%, {}/{} agents)",
        snapshot.health_percentage, snapshot.healthy_agents, snapshot.total_agents
    );
    if !snapshot.currently_running.is_empty() {
        println!("  Running: {}", snapshot.currently_running.join(", "));
    }
    println!();
    println!("{}", format_health_table(snapshot));

    let issues = snapshot.issues();
    if !issues.is_empty() {
        println!();
        println!("{}", style("Issues:").yellow().bold());
        for issue in issues {
            println!("  - {issue}");
        }
    }
}
