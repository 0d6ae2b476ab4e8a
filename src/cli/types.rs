//! CLI type definitions.
//!
//! Clap command structures that define the operator-facing surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "argus")]
#[command(about = "Argus - Analytics Pipeline Orchestrator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Path to a configuration file (default: .argus/config.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize configuration and the run state database
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Run the complete pipeline in dependency order
    RunAll {
        /// Bypass dependency gating (timeouts and retries still apply)
        #[arg(short, long)]
        force: bool,
    },

    /// Run a single agent
    RunAgent {
        /// Agent name (e.g. pattern_recognition)
        #[arg(short, long)]
        agent: String,

        /// Bypass dependency gating (timeouts and retries still apply)
        #[arg(short, long)]
        force: bool,
    },

    /// Show the most recent pipeline run and current health
    Status,

    /// Continuously monitor pipeline health
    Monitor {
        /// Refresh interval in seconds
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },

    /// Run a single health check
    HealthCheck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_agent_parsing() {
        let cli = Cli::try_parse_from([
            "argus",
            "run-agent",
            "--agent",
            "pattern_recognition",
            "--force",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::RunAgent { agent, force } => {
                assert_eq!(agent, "pattern_recognition");
                assert!(force);
            }
            _ => panic!("expected run-agent"),
        }
    }

    #[test]
    fn test_monitor_default_interval() {
        let cli = Cli::try_parse_from(["argus", "monitor"]).unwrap();
        match cli.command {
            Commands::Monitor { interval } => assert_eq!(interval, 60),
            _ => panic!("expected monitor"),
        }
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli =
            Cli::try_parse_from(["argus", "status", "--config", "/etc/argus.yaml"]).unwrap();
        assert_eq!(cli.config.unwrap(), PathBuf::from("/etc/argus.yaml"));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["argus", "explode"]).is_err());
    }
}
