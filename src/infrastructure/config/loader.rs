//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;

use crate::domain::models::Config;

/// Configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.argus/config.yaml` (project config, created by init)
    /// 3. `.argus/local.yaml` (local overrides, optional)
    /// 4. Environment variables (`ARGUS_*` prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".argus/config.yaml"))
            .merge(Yaml::file(".argus/local.yaml"))
            .merge(Env::prefixed("ARGUS_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from an explicit file (the `--config` flag),
    /// still honoring environment overrides.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("ARGUS_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after merging.
    pub fn validate(config: &Config) -> Result<()> {
        if config.python_env.is_empty() {
            anyhow::bail!("python_env cannot be empty");
        }

        if config.database.path.is_empty() {
            anyhow::bail!("database path cannot be empty");
        }
        if config.database.max_connections == 0 {
            anyhow::bail!("database max_connections must be at least 1");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            anyhow::bail!(
                "invalid log level '{}': must be one of trace, debug, info, warn, error",
                config.logging.level
            );
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            anyhow::bail!(
                "invalid log format '{}': must be json or pretty",
                config.logging.format
            );
        }

        if config.dependency_max_age_seconds == 0 {
            anyhow::bail!("dependency_max_age_seconds must be positive");
        }
        if let Some(deadline) = config.pipeline_deadline_seconds {
            if deadline == 0 {
                anyhow::bail!("pipeline_deadline_seconds must be positive when set");
            }
        }

        if !(0.0..=1.0).contains(&config.health.max_error_rate) {
            anyhow::bail!("health.max_error_rate must be between 0 and 1");
        }
        if !(0.0..=1.0).contains(&config.health.min_success_rate) {
            anyhow::bail!("health.min_success_rate must be between 0 and 1");
        }
        if config.health.window_runs == 0 {
            anyhow::bail!("health.window_runs must be at least 1");
        }

        if config.store_retry.max_retries == 0 {
            anyhow::bail!("store_retry.max_retries must be at least 1");
        }

        for (name, overrides) in &config.agents {
            if let Some(0) = overrides.max_retries {
                anyhow::bail!("agent {name}: max_retries cannot be 0");
            }
            if let Some(0) = overrides.timeout_seconds {
                anyhow::bail!("agent {name}: timeout_seconds cannot be 0");
            }
            if let Some(factor) = overrides.backoff_factor {
                if factor < 1.0 {
                    anyhow::bail!("agent {name}: backoff_factor must be >= 1.0");
                }
            }
        }

        Ok(())
    }

    /// Default config YAML written by `argus init`.
    pub fn default_yaml() -> Result<String> {
        serde_yaml::to_string(&Config::default()).context("Failed to render default config")
    }
}
