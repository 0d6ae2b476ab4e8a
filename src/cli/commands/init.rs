//! `init` command: write the default configuration and create the database.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use crate::adapters::sqlite::{create_pool, run_migrations};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

const CONFIG_DIR: &str = ".argus";
const CONFIG_FILE: &str = ".argus/config.yaml";

pub async fn execute(force: bool, json: bool) -> Result<ExitCode> {
    let config_path = Path::new(CONFIG_FILE);
    if config_path.exists() && !force {
        anyhow::bail!("{CONFIG_FILE} already exists; use --force to overwrite");
    }

    std::fs::create_dir_all(CONFIG_DIR).context("Failed to create .argus directory")?;
    std::fs::write(config_path, ConfigLoader::default_yaml()?)
        .context("Failed to write default configuration")?;

    let config = Config::default();
    let pool = create_pool(&format!("sqlite://{}", config.database.path), None)
        .await
        .context("Failed to create run state database")?;
    run_migrations(&pool)
        .await
        .context("Failed to apply database migrations")?;
    pool.close().await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "config": CONFIG_FILE,
                "database": config.database.path,
            }))?
        );
    } else {
        println!("Initialized argus:");
        println!("  Config:   {CONFIG_FILE}");
        println!("  Database: {}", config.database.path);
    }

    Ok(ExitCode::SUCCESS)
}
