//! Application configuration management.
//!
//! Two layers live here:
//! - [`ApiConfig`]: how the request pipeline talks to the server (base URL,
//!   timeout, retry schedule, default headers). Supplied by the environment.
//! - [`Config`]: small user preferences persisted between runs, stored at
//!   `~/.config/rosterline/config.json`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "rosterline";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// HTTP request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Retries for transport failures (in addition to the first attempt).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backoff base; the delay before retry `n` is `base * 2^n`.
pub const DEFAULT_RETRY_BASE_MS: u64 = 1_000;

/// Ceiling for a single backoff delay.
pub const DEFAULT_RETRY_CAP_MS: u64 = 10_000;

/// How often the auto-logout timer checks for an expired credential.
pub const DEFAULT_EXPIRY_CHECK_SECS: u64 = 60;

const ENV_API_URL: &str = "ROSTERLINE_API_URL";
const ENV_TIMEOUT_MS: &str = "ROSTERLINE_TIMEOUT_MS";
const ENV_MAX_RETRIES: &str = "ROSTERLINE_MAX_RETRIES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    pub expiry_check_secs: u64,
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let mut default_headers = BTreeMap::new();
        default_headers.insert("Content-Type".to_string(), "application/json".to_string());

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            retry_cap_ms: DEFAULT_RETRY_CAP_MS,
            expiry_check_secs: DEFAULT_EXPIRY_CHECK_SECS,
            default_headers,
        }
    }
}

impl ApiConfig {
    /// Build a config from `ROSTERLINE_*` environment variables.
    ///
    /// Unset variables keep their defaults. Values that fail to parse are
    /// logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.timeout_ms = ms,
                _ => warn!(var = ENV_TIMEOUT_MS, value = %raw, "Ignoring invalid timeout"),
            }
        }

        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            match raw.trim().parse::<u32>() {
                Ok(n) => config.max_retries = n,
                Err(_) => warn!(var = ENV_MAX_RETRIES, value = %raw, "Ignoring invalid retry count"),
            }
        }

        config
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn expiry_check_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_check_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Overrides the environment-supplied base URL when set.
    pub api_url: Option<String>,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Resolve the effective API config: environment first, then the
    /// persisted `api_url` override.
    pub fn api_config(&self) -> ApiConfig {
        let config = ApiConfig::from_env();
        match self.api_url {
            Some(ref url) => config.with_base_url(url.clone()),
            None => config,
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
