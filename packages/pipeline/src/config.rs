use std::time::Duration;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
        })
    }

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// Settings for the bulk transfer worker binary.
#[derive(Debug, Clone)]
pub struct BulkTransferWorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Base URL of the external asset-management system.
    pub asset_system_url: String,
    pub asset_system_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
}

impl BulkTransferWorkerConfig {
    pub fn from_env() -> Result<Self> {
        let asset_system_url = required_env("ASSET_SYSTEM_URL")?;
        if !asset_system_url.starts_with("http://") && !asset_system_url.starts_with("https://") {
            return Err(PipelineError::Config(format!(
                "ASSET_SYSTEM_URL must be an http(s) URL, got {asset_system_url}"
            )));
        }

        let poll_interval = Duration::from_secs(env_or("WORKER_POLL_INTERVAL_SECS", 5));
        let max_poll_interval = Duration::from_secs(env_or("WORKER_MAX_POLL_INTERVAL_SECS", 60));

        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
            asset_system_url: asset_system_url.trim_end_matches('/').to_string(),
            asset_system_timeout: Duration::from_secs(env_or("ASSET_SYSTEM_TIMEOUT_SECS", 30)),
            poll_interval,
            max_poll_interval: max_poll_interval.max(poll_interval),
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            database_url: self.database_url.clone(),
            max_connections: self.max_connections,
        }
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| PipelineError::Config(format!("{name} not set")))
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
