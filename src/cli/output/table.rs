//! Table output formatting for CLI commands.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::models::{AgentHealth, HealthSnapshot, RunRecord, RunStatus};

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn status_color(status: RunStatus) -> Color {
    match status {
        RunStatus::Succeeded => Color::Green,
        RunStatus::Failed | RunStatus::TimedOut => Color::Red,
        RunStatus::Skipped => Color::Yellow,
        RunStatus::Pending | RunStatus::Running => Color::Cyan,
    }
}

/// Structured summary of a pipeline run: agent -> status -> error message.
pub fn format_run_records(records: &[RunRecord]) -> String {
    let mut table = base_table();
    table.set_header(vec![
        Cell::new("Agent").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Attempt").add_attribute(Attribute::Bold),
        Cell::new("Duration").add_attribute(Attribute::Bold),
        Cell::new("Error").add_attribute(Attribute::Bold),
    ]);

    for record in records {
        let duration = record
            .duration_ms
            .map_or_else(|| "-".to_string(), format_duration_ms);
        let attempt = if record.attempt == 0 {
            "-".to_string()
        } else {
            record.attempt.to_string()
        };
        table.add_row(vec![
            Cell::new(&record.agent_name),
            Cell::new(record.status.to_string()).fg(status_color(record.status)),
            Cell::new(attempt),
            Cell::new(duration),
            Cell::new(record.error_message.as_deref().unwrap_or("-")),
        ]);
    }

    table.to_string()
}

/// Per-agent health table for status and health-check output.
pub fn format_health_table(snapshot: &HealthSnapshot) -> String {
    let mut table = base_table();
    table.set_header(vec![
        Cell::new("Agent").add_attribute(Attribute::Bold),
        Cell::new("Healthy").add_attribute(Attribute::Bold),
        Cell::new("Runs").add_attribute(Attribute::Bold),
        Cell::new("Success").add_attribute(Attribute::Bold),
        Cell::new("Last success").add_attribute(Attribute::Bold),
        Cell::new("Stale").add_attribute(Attribute::Bold),
    ]);

    for agent in &snapshot.agents {
        table.add_row(health_row(agent));
    }

    table.to_string()
}

fn health_row(agent: &AgentHealth) -> Vec<Cell> {
    let healthy = if agent.healthy {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::Red)
    };

    let last_success = agent.seconds_since_success.map_or_else(
        || "never".to_string(),
        |secs| format!("{} ago", format_duration_ms(secs * 1000)),
    );

    let stale = if agent.stale {
        Cell::new("yes").fg(Color::Yellow)
    } else {
        Cell::new("no")
    };

    let running_marker = if agent.currently_running { " *" } else { "" };

    vec![
        Cell::new(format!("{}{running_marker}", agent.agent)),
        healthy,
        Cell::new(agent.total_runs.to_string()),
        Cell::new(format!("{:.0}%", agent.success_rate * 100.0)),
        Cell::new(last_success),
        stale,
    ]
}

pub fn format_duration_ms(ms: i64) -> String {
    let secs = ms / 1000;
    if secs < 60 {
        format!("{}.{:01}s", secs, (ms % 1000) / 100)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
