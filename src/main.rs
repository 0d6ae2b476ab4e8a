//! Argus CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use argus::cli::{AppContext, Cli, Commands};
use argus::infrastructure::config::ConfigLoader;
use argus::infrastructure::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Configuration error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Failed to initialize logging: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Init { force } => argus::cli::commands::init::execute(force, cli.json).await,
        command => {
            let ctx = match AppContext::init(config).await {
                Ok(ctx) => ctx,
                Err(err) => return fail(&err, cli.json),
            };
            match command {
                Commands::RunAll { force } => {
                    argus::cli::commands::run::run_all(&ctx, force, cli.json).await
                }
                Commands::RunAgent { agent, force } => {
                    argus::cli::commands::run::run_agent(&ctx, &agent, force, cli.json).await
                }
                Commands::Status => argus::cli::commands::status::execute(&ctx, cli.json).await,
                Commands::Monitor { interval } => {
                    argus::cli::commands::monitor::monitor(&ctx, interval, cli.json).await
                }
                Commands::HealthCheck => {
                    argus::cli::commands::monitor::health_check(&ctx, cli.json).await
                }
                Commands::Init { .. } => unreachable!("handled above"),
            }
        }
    };

    match result {
        Ok(code) => code,
        Err(err) => fail(&err, cli.json),
    }
}

fn fail(err: &anyhow::Error, json: bool) -> ExitCode {
    if json {
        let payload = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!("{payload}");
    } else {
        eprintln!("Error: {err:#}");
    }
    ExitCode::FAILURE
}
