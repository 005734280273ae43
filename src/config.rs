//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::adapters::AdapterConfig;
use crate::cache::{CleanupConfig, CleanupPriority, MemoryLimits};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cache manager and per-domain store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_total_mb")]
    pub max_total_mb: u64,

    #[serde(default = "default_warning_mb")]
    pub warning_mb: u64,

    #[serde(default = "default_long_ttl_secs")]
    pub long_ttl_secs: u64,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    #[serde(default = "default_expenses_cache")]
    pub expenses: DomainCacheConfig,

    #[serde(default = "default_revenue_cache")]
    pub revenue: DomainCacheConfig,

    #[serde(default = "default_patients_cache")]
    pub patients: DomainCacheConfig,
}

fn default_max_total_mb() -> u64 {
    50
}

fn default_warning_mb() -> u64 {
    40
}

fn default_long_ttl_secs() -> u64 {
    600 // 10 minutes
}

fn default_cleanup_interval_secs() -> u64 {
    120
}

fn default_expenses_cache() -> DomainCacheConfig {
    DomainCacheConfig::tuned(50, 60)
}

fn default_revenue_cache() -> DomainCacheConfig {
    DomainCacheConfig::tuned(50, 30)
}

fn default_patients_cache() -> DomainCacheConfig {
    DomainCacheConfig::tuned(30, 300)
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_total_mb: default_max_total_mb(),
            warning_mb: default_warning_mb(),
            long_ttl_secs: default_long_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            expenses: default_expenses_cache(),
            revenue: default_revenue_cache(),
            patients: default_patients_cache(),
        }
    }
}

impl CacheConfig {
    /// Byte ceilings for the shared cache manager
    pub fn memory_limits(&self) -> MemoryLimits {
        MemoryLimits {
            max_total_bytes: (self.max_total_mb * 1024 * 1024) as usize,
            warning_bytes: (self.warning_mb * 1024 * 1024) as usize,
            long_ttl: chrono::Duration::seconds(self.long_ttl_secs as i64),
        }
    }

    /// How often the periodic sweep runs
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Store sizing for one adapter domain
#[derive(Debug, Clone, Deserialize)]
pub struct DomainCacheConfig {
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Eviction priority: `lru`, `size`, or `fifo`
    #[serde(default = "default_priority")]
    pub priority: String,

    #[serde(default = "default_preload_delay_ms")]
    pub preload_delay_ms: u64,
}

fn default_max_items() -> usize {
    50
}

fn default_max_age_secs() -> u64 {
    60
}

fn default_priority() -> String {
    "lru".to_string()
}

fn default_preload_delay_ms() -> u64 {
    500
}

impl Default for DomainCacheConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_age_secs: default_max_age_secs(),
            priority: default_priority(),
            preload_delay_ms: default_preload_delay_ms(),
        }
    }
}

impl DomainCacheConfig {
    fn tuned(max_items: usize, max_age_secs: u64) -> Self {
        Self {
            max_items,
            max_age_secs,
            ..Self::default()
        }
    }

    /// Convert into the adapter-facing settings
    ///
    /// An unknown priority string falls back to LRU.
    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            cleanup: CleanupConfig {
                max_items: self.max_items,
                max_age: chrono::Duration::seconds(self.max_age_secs as i64),
                priority: CleanupPriority::from_str(&self.priority).unwrap_or_default(),
            },
            preload_delay: std::time::Duration::from_millis(self.preload_delay_ms),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        // Try default config locations
        let config_paths = [
            dirs::config_dir().map(|p| p.join("chairside").join("config.toml")),
            Some(PathBuf::from("/etc/chairside/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Cache overrides
        if let Ok(mb) = std::env::var("CHAIRSIDE_CACHE_MAX_MB") {
            if let Ok(mb) = mb.parse() {
                self.cache.max_total_mb = mb;
            }
        }
        if let Ok(mb) = std::env::var("CHAIRSIDE_CACHE_WARNING_MB") {
            if let Ok(mb) = mb.parse() {
                self.cache.warning_mb = mb;
            }
        }
        if let Ok(secs) = std::env::var("CHAIRSIDE_CLEANUP_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                self.cache.cleanup_interval_secs = secs;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("CHAIRSIDE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CHAIRSIDE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Chairside Configuration
#
# Environment variables override these settings:
# - CHAIRSIDE_CACHE_MAX_MB
# - CHAIRSIDE_CACHE_WARNING_MB
# - CHAIRSIDE_CLEANUP_INTERVAL_SECS
# - CHAIRSIDE_LOG_LEVEL
# - CHAIRSIDE_LOG_FORMAT

[cache]
# Hard ceiling for all tracked cache entries (MB)
max_total_mb = 50

# Warning threshold (MB)
warning_mb = 40

# Lifetime for long-lived entries during a global sweep (seconds)
long_ttl_secs = 600

# How often the background cleanup sweep runs (seconds)
cleanup_interval_secs = 120

[cache.expenses]
# Item ceiling per expense store
max_items = 50

# Entry lifetime (seconds)
max_age_secs = 60

# Eviction priority: lru, size, or fifo
priority = "lru"

# Delay before preloading adjacent months (ms)
preload_delay_ms = 500

[cache.revenue]
max_items = 50
max_age_secs = 30
priority = "lru"
preload_delay_ms = 500

[cache.patients]
max_items = 30
max_age_secs = 300
priority = "lru"
preload_delay_ms = 500

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/chairside/chairside.log"
"#
    .to_string()
}
