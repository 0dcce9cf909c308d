//! Application configuration management.
//!
//! Configuration is stored at `~/.config/campuscache/config.json` and can be
//! overridden from the environment (including a `.env` file loaded by the
//! binary):
//!
//! - `CAMPUSCACHE_API_URL`
//! - `CAMPUSCACHE_TOKEN`
//! - `CAMPUSCACHE_CACHE_DIR`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{ttl, CacheOptions};
use crate::retry::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "campuscache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Portal used when nothing is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

pub const ENV_API_URL: &str = "CAMPUSCACHE_API_URL";
pub const ENV_TOKEN: &str = "CAMPUSCACHE_TOKEN";
pub const ENV_CACHE_DIR: &str = "CAMPUSCACHE_CACHE_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<i64>,
    pub group_id: Option<i64>,
    /// TTL tier name: short, medium, long or day
    pub default_ttl: Option<String>,
    pub retry_max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Override fields from environment variables, looked up through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_API_URL) {
            self.api_base_url = Some(url);
        }
        if let Some(token) = non_empty(ENV_TOKEN) {
            self.token = Some(token);
        }
        if let Some(dir) = non_empty(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE_URL)
    }

    /// Default TTL for cache writes. Unknown tier names fall back to medium.
    pub fn default_ttl(&self) -> Duration {
        match self.default_ttl.as_deref() {
            None => ttl::MEDIUM,
            Some(name) => ttl::parse_tier(name).unwrap_or_else(|| {
                warn!(tier = name, "Unknown TTL tier in config, using medium");
                ttl::MEDIUM
            }),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            self.retry_base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_BASE_DELAY),
        )
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            default_ttl: self.default_ttl(),
            ..CacheOptions::default()
        }
    }
}
