use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::common::error::{ConsolidateError, Result};

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the per-location series files live under.
    pub data_root: String,
    /// Flat cumulative runs longer than this many days are reported stale.
    pub stale_after_days: i64,
    /// Bound on concurrently running location workers.
    pub max_concurrent_locations: usize,
    pub http: HttpConfig,
    pub secondary_feed_url: String,
    /// Tracing level directive applied at startup.
    pub log_directive: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub retry_budget: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: "data".to_string(),
            stale_after_days: 21,
            max_concurrent_locations: 4,
            http: HttpConfig::default(),
            secondary_feed_url: crate::infra::who_feed::WHO_VACCINATION_DATA_URL.to_string(),
            log_directive: crate::logging::DEFAULT_DIRECTIVE.to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_budget: 2,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ConsolidateError::Config(format!("Failed to read config file '{path}': {e}"))
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Loads `config.toml` when present, otherwise falls back to defaults.
    pub fn load_or_default() -> Result<Self> {
        let path = "config.toml";
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
