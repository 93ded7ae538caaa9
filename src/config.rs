//! Configuration for the pool and the localization store.
//!
//! Both facades can be configured in code through builder methods or
//! loaded from a TOML file:
//!
//! ```toml
//! [pool]
//! max_entries = 50
//! idle_ttl_secs = 600
//!
//! [localization]
//! max_entries = 1000
//! idle_ttl_secs = 480
//! default_language = "en"
//! ```
//!
//! Every field is optional and falls back to the defaults shown above.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::cache::CacheConfig;
use crate::{AlmanacError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub localization: LocalizationConfig,
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        self.pool.cache_config().validate()?;
        self.localization.cache_config().validate()?;
        if self.localization.default_language.trim().is_empty() {
            return Err(AlmanacError::Configuration(
                "localization.default_language must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Object pool limits.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of resident kinds (default: 50).
    #[serde(default = "default_pool_max_entries")]
    pub max_entries: usize,
    /// Idle window before a kind is released (default: 10 minutes).
    #[serde(
        rename = "idle_ttl_secs",
        default = "default_pool_idle_ttl",
        deserialize_with = "duration_from_secs"
    )]
    pub idle_ttl: Duration,
    /// Sweep period; defaults to the idle window.
    #[serde(
        rename = "sweep_interval_secs",
        default,
        deserialize_with = "optional_duration_from_secs"
    )]
    pub sweep_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_entries: default_pool_max_entries(),
            idle_ttl: default_pool_idle_ttl(),
            sweep_interval: None,
        }
    }
}

impl PoolConfig {
    /// Create a config with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of resident kinds.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the idle window.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Set the sweep period.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Cache settings for the pool's backing cache.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            name: "config_pool",
            max_entries: self.max_entries,
            idle_ttl: self.idle_ttl,
            sweep_interval: self.sweep_interval,
        }
    }
}

fn default_pool_max_entries() -> usize {
    50
}

fn default_pool_idle_ttl() -> Duration {
    Duration::from_secs(10 * 60)
}

/// Localization hot cache limits and the startup language.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalizationConfig {
    /// Maximum number of cached translations (default: 1,000).
    #[serde(default = "default_i18n_max_entries")]
    pub max_entries: usize,
    /// Idle window before a cached translation is dropped (default: 8 minutes).
    #[serde(
        rename = "idle_ttl_secs",
        default = "default_i18n_idle_ttl",
        deserialize_with = "duration_from_secs"
    )]
    pub idle_ttl: Duration,
    /// Sweep period; defaults to the idle window.
    #[serde(
        rename = "sweep_interval_secs",
        default,
        deserialize_with = "optional_duration_from_secs"
    )]
    pub sweep_interval: Option<Duration>,
    /// Language reported before the first switch (default: "en").
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for LocalizationConfig {
    fn default() -> Self {
        Self {
            max_entries: default_i18n_max_entries(),
            idle_ttl: default_i18n_idle_ttl(),
            sweep_interval: None,
            default_language: default_language(),
        }
    }
}

impl LocalizationConfig {
    /// Create a config with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached translations.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the idle window.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Set the sweep period.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Set the startup language.
    pub fn default_language(mut self, language: impl Into<String>) -> Self {
        self.default_language = language.into();
        self
    }

    /// Cache settings for the hot cache.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            name: "i18n",
            max_entries: self.max_entries,
            idle_ttl: self.idle_ttl,
            sweep_interval: self.sweep_interval,
        }
    }
}

fn default_i18n_max_entries() -> usize {
    1_000
}

fn default_i18n_idle_ttl() -> Duration {
    Duration::from_secs(8 * 60)
}

fn default_language() -> String {
    "en".to_string()
}

fn duration_from_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

fn optional_duration_from_secs<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_facade_tuning() {
        let config = Config::default();
        assert_eq!(config.pool.max_entries, 50);
        assert_eq!(config.pool.idle_ttl, Duration::from_secs(600));
        assert_eq!(config.localization.max_entries, 1_000);
        assert_eq!(config.localization.idle_ttl, Duration::from_secs(480));
        assert_eq!(config.localization.default_language, "en");
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.pool.max_entries, 50);
        assert!(config.pool.sweep_interval.is_none());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = Config::from_toml_str(
            r#"
            [pool]
            max_entries = 8
            sweep_interval_secs = 30

            [localization]
            idle_ttl_secs = 60
            default_language = "cn"
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.max_entries, 8);
        assert_eq!(config.pool.idle_ttl, Duration::from_secs(600));
        assert_eq!(config.pool.sweep_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.localization.idle_ttl, Duration::from_secs(60));
        assert_eq!(config.localization.default_language, "cn");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = Config::from_toml_str("[pool]\nmax_entries = 0\n").unwrap_err();
        assert!(matches!(err, AlmanacError::Configuration(_)));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = Config::from_toml_str("[pool\n").unwrap_err();
        assert!(matches!(err, AlmanacError::Toml(_)));
    }

    #[test]
    fn cache_configs_carry_names() {
        let config = Config::default();
        assert_eq!(config.pool.cache_config().name, "config_pool");
        assert_eq!(config.localization.cache_config().name, "i18n");
    }
}
