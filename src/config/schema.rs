//! Configuration schema for cachelock
//!
//! Configuration is stored at `~/.config/cachelock/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache location
    pub cache: CacheConfig,

    /// Lock acquisition policy
    pub lock: LockConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache location settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory that relative entry paths resolve against
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("cachelock"),
        }
    }
}

/// Lock acquisition policy
///
/// Blocking acquisition backs off exponentially from `initial_backoff_ms`
/// up to `max_backoff_ms` and gives up after `timeout_ms` or
/// `max_attempts`, whichever comes first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Total time a blocking acquire may wait
    pub timeout_ms: u64,

    /// Upper bound on creation attempts (0 = bounded by time only)
    pub max_attempts: u32,

    /// First sleep between attempts
    pub initial_backoff_ms: u64,

    /// Cap for the exponential backoff
    pub max_backoff_ms: u64,

    /// Age after which a sentinel written on another host is considered
    /// stale. Unset means foreign sentinels are never reclaimed.
    pub foreign_lock_ttl_secs: Option<u64>,

    /// Age after which an unparseable sentinel is considered stale
    pub corrupt_lock_grace_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 90_000,
            max_attempts: 0,
            initial_backoff_ms: 10,
            max_backoff_ms: 500,
            foreign_lock_ttl_secs: None,
            corrupt_lock_grace_secs: 30,
        }
    }
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn foreign_lock_ttl(&self) -> Option<Duration> {
        self.foreign_lock_ttl_secs.map(Duration::from_secs)
    }

    pub fn corrupt_lock_grace(&self) -> Duration {
        Duration::from_secs(self.corrupt_lock_grace_secs)
    }

    /// Reject policies that would spin or never back off
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_backoff_ms == 0 {
            return Err("lock.initial_backoff_ms must be greater than zero".to_string());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(format!(
                "lock.initial_backoff_ms ({}) exceeds lock.max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.lock.validate().is_ok());
        assert_eq!(config.general.log_format, "text");
        assert!(config.cache.root.ends_with("cachelock"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [lock]
            timeout_ms = 250
            foreign_lock_ttl_secs = 600
            "#,
        )
        .unwrap();

        assert_eq!(config.lock.timeout(), Duration::from_millis(250));
        assert_eq!(config.lock.foreign_lock_ttl(), Some(Duration::from_secs(600)));
        assert_eq!(config.lock.max_backoff_ms, 500);
    }

    #[test]
    fn validate_rejects_inverted_backoff() {
        let lock = LockConfig {
            initial_backoff_ms: 1000,
            max_backoff_ms: 10,
            ..LockConfig::default()
        };
        assert!(lock.validate().is_err());

        let lock = LockConfig {
            initial_backoff_ms: 0,
            ..LockConfig::default()
        };
        assert!(lock.validate().is_err());
    }
}
