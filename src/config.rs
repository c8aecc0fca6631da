use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_FINANCE_DATA_ENDPOINT: &str =
    "https://script.google.com/macros/s/REPLACE_ME/exec";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    /// Empty means every origin is allowed.
    pub allowed_origins: Vec<String>,
    /// Whether `Origin: null` (file:// pages, sandboxed frames) is allowed.
    pub allow_null_origin: bool,
    pub finance_data_endpoint: String,
    pub upstream_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            allowed_origins: Vec::new(),
            allow_null_origin: true,
            finance_data_endpoint: DEFAULT_FINANCE_DATA_ENDPOINT.to_string(),
            upstream_timeout_secs: None,
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then the process environment.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config = match config_path {
            Some(path) => read_config(path)?,
            None => Config::default(),
        };

        config.with_env(|key| std::env::var(key).ok())
    }

    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // unset and empty are treated the same
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(port) = var("PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT: {}", port))?;
        }

        if let Some(origins) = var("ALLOWED_ORIGINS") {
            self.allowed_origins = parse_origin_list(&origins);
        }

        if let Some(allow_null) = var("ALLOW_NULL_ORIGIN") {
            self.allow_null_origin = allow_null.to_lowercase() == "true";
        }

        if let Some(endpoint) = var("FINANCE_DATA_ENDPOINT") {
            self.finance_data_endpoint = endpoint;
        }

        if let Some(secs) = var("UPSTREAM_TIMEOUT_SECS") {
            let secs = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid UPSTREAM_TIMEOUT_SECS: {}", secs))?;
            self.upstream_timeout_secs = Some(secs);
        }

        Ok(self)
    }

    pub fn upstream_timeout(&self) -> Option<Duration> {
        self.upstream_timeout_secs.map(Duration::from_secs)
    }
}

pub fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

fn read_config(config_path: &str) -> Result<Config> {
    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file {}", config_path))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config file {}", config_path))
}
