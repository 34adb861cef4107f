//! Process-wide cache configuration.
//!
//! Set once at startup and read on every population. Values come from
//! code, from any serde format, or from the environment:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `ANIME_CACHE_DEFAULT_EXPIRATION_SECS` | `default_expiration` | 300 |
//! | `ANIME_CACHE_DEFAULT_ITEM_SIZE` | `default_item_size` | 1 |
//! | `ANIME_CACHE_SIZE_LIMIT` | `size_limit` | 1024 |
//! | `ANIME_CACHE_TRACK_STATISTICS` | `track_statistics` | true |

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_DEFAULT_EXPIRATION_SECS: &str = "ANIME_CACHE_DEFAULT_EXPIRATION_SECS";
pub const ENV_DEFAULT_ITEM_SIZE: &str = "ANIME_CACHE_DEFAULT_ITEM_SIZE";
pub const ENV_SIZE_LIMIT: &str = "ANIME_CACHE_SIZE_LIMIT";
pub const ENV_TRACK_STATISTICS: &str = "ANIME_CACHE_TRACK_STATISTICS";

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Expiration applied when a population does not specify one.
    #[serde(default = "default_expiration", with = "duration_secs")]
    pub default_expiration: Duration,

    /// Size units charged when a population does not specify a size.
    #[serde(default = "default_item_size")]
    pub default_item_size: u64,

    /// Total size units the store holds before evicting for capacity.
    #[serde(default = "default_size_limit")]
    pub size_limit: u64,

    /// When false, statistics snapshots are zeroed.
    #[serde(default = "default_track_statistics")]
    pub track_statistics: bool,
}

fn default_expiration() -> Duration {
    Duration::from_secs(300)
}

fn default_item_size() -> u64 {
    1
}

fn default_size_limit() -> u64 {
    1024
}

fn default_track_statistics() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            default_expiration: default_expiration(),
            default_item_size: default_item_size(),
            size_limit: default_size_limit(),
            track_statistics: default_track_statistics(),
        }
    }
}

impl CacheConfig {
    pub fn with_default_expiration(mut self, ttl: Duration) -> Self {
        self.default_expiration = ttl;
        self
    }

    pub fn with_default_item_size(mut self, size: u64) -> Self {
        self.default_item_size = size;
        self
    }

    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.size_limit = limit;
        self
    }

    pub fn with_track_statistics(mut self, enabled: bool) -> Self {
        self.track_statistics = enabled;
        self
    }

    /// Defaults overridden by any `ANIME_CACHE_*` variables that are set.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if a variable does not parse or the
    /// result fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = CacheConfig::default();

        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_DEFAULT_EXPIRATION_SECS)? {
            config.default_expiration = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var(&lookup, ENV_DEFAULT_ITEM_SIZE)? {
            config.default_item_size = size;
        }
        if let Some(limit) = parse_var(&lookup, ENV_SIZE_LIMIT)? {
            config.size_limit = limit;
        }
        if let Some(raw) = lookup(ENV_TRACK_STATISTICS) {
            config.track_statistics = parse_flag(ENV_TRACK_STATISTICS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the store cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for a zero expiration, item size or
    /// size limit.
    pub fn validate(&self) -> Result<()> {
        if self.default_expiration.is_zero() {
            return Err(Error::ConfigError(
                "default_expiration must be greater than zero".to_string(),
            ));
        }
        if self.default_item_size == 0 {
            return Err(Error::ConfigError(
                "default_item_size must be greater than zero".to_string(),
            ));
        }
        if self.size_limit == 0 {
            return Err(Error::ConfigError(
                "size_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, L>(lookup: &L, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    L: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::ConfigError(format!("{}={:?}: {}", name, raw, e))),
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::ConfigError(format!(
            "{}={:?}: expected a boolean",
            name, raw
        ))),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
