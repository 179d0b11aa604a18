use anyhow::{Context, Result, anyhow};
use chrono::TimeDelta;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::{engine::CachePolicy, provider::openweather::DEFAULT_ENDPOINT};

/// Environment variable that overrides the API key stored on disk.
pub const API_KEY_ENV: &str = "OPENWEATHERMAP_API_KEY";

pub const DEFAULT_TTL_MS: u64 = 600_000;

/// Highest rounding granularity accepted without a warning. Beyond this the
/// rounding step is below f64 resolution for typical coordinates.
const MAX_KEY_DECIMALS: u8 = 12;

/// Cache behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries younger than this many milliseconds are served without a fetch.
    pub ttl_ms: u64,

    /// Round coordinates to this many decimals when forming the cache key.
    /// Absent means raw values are used verbatim.
    pub key_decimals: Option<u8>,

    /// Serve an expired entry when the fetch fails instead of reporting the error.
    pub serve_stale_on_error: bool,

    /// Override for the cache directory. Defaults to the platform cache dir.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            key_decimals: None,
            serve_stale_on_error: false,
            dir: None,
        }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
///
/// [cache]
/// ttl_ms = 600000
/// key_decimals = 3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub request_timeout_secs: u64,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: 10,
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load config from disk (or defaults on first run), then apply the
    /// environment override for the API key.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        let mut cfg = Self::load_from(&path)?;
        cfg.apply_env_api_key(std::env::var(API_KEY_ENV).ok());
        Ok(cfg)
    }

    /// Load config from an explicit path without consulting the environment.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("dev", "geoweather", "geoweather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory backing the persistent weather cache.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::project_dirs()?.cache_dir().join("weather")),
        }
    }

    /// A non-empty environment value replaces whatever the file said.
    pub fn apply_env_api_key(&mut self, value: Option<String>) {
        if let Some(key) = value.filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(key.trim().to_string());
        }
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// API key to send, or an empty string when none is configured.
    pub fn api_key_or_empty(&self) -> &str {
        self.api_key.as_deref().unwrap_or("")
    }

    pub fn cache_policy(&self) -> CachePolicy {
        let ttl_ms = i64::try_from(self.cache.ttl_ms).unwrap_or(i64::MAX);
        CachePolicy {
            ttl: TimeDelta::try_milliseconds(ttl_ms).unwrap_or(TimeDelta::MAX),
            key_decimals: self.cache.key_decimals,
            serve_stale_on_error: self.cache.serve_stale_on_error,
        }
    }

    /// Problems worth reporting at startup. None of them prevent running.
    pub fn issues(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if !self.has_api_key() {
            issues.push(ConfigIssue::MissingApiKey);
        }
        if self.cache.ttl_ms == 0 {
            issues.push(ConfigIssue::ZeroTtl);
        }
        if let Some(n) = self.cache.key_decimals.filter(|n| *n > MAX_KEY_DECIMALS) {
            issues.push(ConfigIssue::KeyDecimalsTooFine(n));
        }
        if self.request_timeout_secs == 0 {
            issues.push(ConfigIssue::ZeroTimeout);
        }

        issues
    }

    /// Log every startup issue. Returns how many were found.
    pub fn report_issues(&self) -> usize {
        let issues = self.issues();
        for issue in &issues {
            match issue {
                ConfigIssue::MissingApiKey => tracing::error!("{issue}"),
                _ => tracing::warn!("{issue}"),
            }
        }
        issues.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigIssue {
    MissingApiKey,
    ZeroTtl,
    KeyDecimalsTooFine(u8),
    ZeroTimeout,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigIssue::MissingApiKey => write!(
                f,
                "API key missing. Set {API_KEY_ENV} or run `geoweather configure`; requests will be rejected"
            ),
            ConfigIssue::ZeroTtl => write!(f, "cache.ttl_ms is 0; every lookup will hit the network"),
            ConfigIssue::KeyDecimalsTooFine(n) => write!(
                f,
                "cache.key_decimals = {n} exceeds {MAX_KEY_DECIMALS}; rounding will have no effect"
            ),
            ConfigIssue::ZeroTimeout => {
                write!(f, "request_timeout_secs is 0; every request will time out")
            }
        }
    }
}
