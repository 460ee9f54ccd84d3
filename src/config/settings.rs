//! Configuration settings for the Rota scheduling engine.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduling: SchedulingConfig,
    pub remote: RemoteCalendarConfig,
    pub credentials: CredentialConfig,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduling: SchedulingConfig::default(),
            remote: RemoteCalendarConfig::default(),
            credentials: CredentialConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations or use defaults.
    pub fn load() -> Result<Self> {
        let config_paths = [
            // Current directory
            PathBuf::from("rota.toml"),
            PathBuf::from("config.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("rota/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.scheduling.max_search_days == 0 {
            return Err(ConfigError::Invalid("max_search_days must be > 0".to_string()).into());
        }

        if self.remote.enabled {
            if self.remote.base_url.is_empty() {
                return Err(ConfigError::MissingField("remote.base_url".to_string()).into());
            }
            if self.remote.calendar_id.is_empty() {
                return Err(ConfigError::MissingField("remote.calendar_id".to_string()).into());
            }
            if self.credentials.token_url.is_empty() {
                return Err(ConfigError::MissingField("credentials.token_url".to_string()).into());
            }
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be > 0".to_string()).into());
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(
                ConfigError::Invalid("cache.sweep_interval_secs must be > 0".to_string()).into(),
            );
        }

        Ok(())
    }
}

/// Scheduling defaults and search bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Default lesson duration in minutes when a caller does not pass one.
    pub default_duration_minutes: i64,
    /// Horizon for the forward next-slot search, in days.
    pub max_search_days: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: 60,
            max_search_days: 30,
        }
    }
}

/// External calendar provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteCalendarConfig {
    /// Whether an external calendar is connected at all.
    pub enabled: bool,
    /// Base URL of the provider API.
    pub base_url: String,
    /// Calendar identifier on the provider.
    pub calendar_id: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Page size requested from the provider event listing.
    pub page_size: usize,
}

impl Default for RemoteCalendarConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            calendar_id: "primary".to_string(),
            timeout_secs: 30,
            page_size: 250,
        }
    }
}

/// Credential exchange configuration for the external calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Token endpoint URL.
    pub token_url: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret (loaded from ROTA_CLIENT_SECRET if not set).
    pub client_secret: Option<String>,
    /// Treat a token as expired this many seconds before its actual expiry.
    pub safety_buffer_secs: i64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            client_id: String::new(),
            client_secret: None,
            safety_buffer_secs: 300,
        }
    }
}

/// Availability cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled.
    pub enabled: bool,
    /// Maximum entries per cache before oldest-entry eviction kicks in.
    pub max_entries: usize,
    /// TTL for computed availability and event listings, in seconds.
    pub availability_ttl_secs: u64,
    /// TTL for constraint/configuration snapshots, in seconds.
    pub config_ttl_secs: u64,
    /// Interval of the background sweep that drops expired entries.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            availability_ttl_secs: 90,
            config_ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}
