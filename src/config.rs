//! Configuration management

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Upper bound for `health.probe_ttl` and `health.probe_margin`; each probe
/// sleeps for their sum.
pub const MAX_PROBE_WAIT: Duration = Duration::from_secs(3600);

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// TTL entry store configuration
    pub store: StoreConfig,
    /// Lock configuration
    pub lock: LockConfig,
    /// Alert debouncing configuration
    pub debounce: DebounceConfig,
    /// Deny-list configuration
    pub blacklist: BlacklistConfig,
    /// Health probe configuration
    pub health: HealthConfig,
    /// Flash-sale inventory configuration
    pub flashsale: FlashsaleConfig,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // GATEKEEPER_HEALTH__INTERVAL=10s -> health.interval
        figment = figment.merge(Env::prefixed("GATEKEEPER_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the background tasks spin or the
    /// inventory invariants unsatisfiable.
    pub fn validate(&self) -> Result<()> {
        if self.store.sweep_interval.is_zero() {
            return Err(Error::Config("store.sweep_interval must be > 0".into()));
        }
        if self.lock.default_ttl.is_zero() {
            return Err(Error::Config("lock.default_ttl must be > 0".into()));
        }
        if self.debounce.window_minutes == 0 {
            return Err(Error::Config("debounce.window_minutes must be > 0".into()));
        }
        if self.blacklist.max_ttl.is_zero() {
            return Err(Error::Config("blacklist.max_ttl must be > 0".into()));
        }
        if self.health.enabled && self.health.interval.is_zero() {
            return Err(Error::Config("health.interval must be > 0".into()));
        }
        if self.health.probe_ttl < Duration::from_secs(1) {
            return Err(Error::Config("health.probe_ttl must be at least 1s".into()));
        }
        if self.health.probe_ttl > MAX_PROBE_WAIT || self.health.probe_margin > MAX_PROBE_WAIT {
            return Err(Error::Config(format!(
                "health.probe_ttl and health.probe_margin must not exceed {}s",
                MAX_PROBE_WAIT.as_secs()
            )));
        }
        for item in &self.flashsale.items {
            if item.item_id.is_empty() {
                return Err(Error::Config("flashsale item_id must not be empty".into()));
            }
            if item.total < 0 || item.limit < 0 {
                return Err(Error::Config(format!(
                    "flashsale item '{}': total and limit must be >= 0",
                    item.item_id
                )));
            }
        }
        Ok(())
    }
}

/// TTL entry store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How often the background sweep removes expired entries
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Expiry applied by [`crate::lock::Locks::acquire`] when the caller has no better estimate
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Backoff used by [`crate::lock::Locks::acquire_with_retry`]
    pub retry: LockRetryConfig,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30),
            retry: LockRetryConfig::default(),
        }
    }
}

/// Retry configuration for composed lock acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockRetryConfig {
    /// Enable retries
    pub enabled: bool,
    /// Maximum retry attempts after the first try
    pub max_attempts: usize,
    /// Initial backoff duration
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f32,
}

impl Default for LockRetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

/// Alert debouncing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Suppression window for duplicate alerts
    pub window_minutes: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window_minutes: 10 }
    }
}

/// Deny-list configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlacklistConfig {
    /// Upper bound on how long any single entry may stay listed
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            max_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Health probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Run the periodic probe task
    pub enabled: bool,
    /// TTL of the synthetic entry written by each probe (whole seconds)
    #[serde(with = "humantime_serde")]
    pub probe_ttl: Duration,
    /// Extra wait past `probe_ttl` before checking the entry is gone
    #[serde(with = "humantime_serde")]
    pub probe_margin: Duration,
    /// Interval between periodic probes
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Consecutive failed probes before the store is reported unhealthy
    pub unhealthy_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_ttl: Duration::from_secs(1),
            probe_margin: Duration::from_millis(500),
            interval: Duration::from_secs(60),
            unhealthy_threshold: 3,
        }
    }
}

/// Flash-sale configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FlashsaleConfig {
    /// Items initialised when the service starts
    pub items: Vec<FlashsaleItemConfig>,
}

/// One flash-sale item to initialise at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashsaleItemConfig {
    /// Item identifier
    pub item_id: String,
    /// Total inventory available for the sale
    pub total: i64,
    /// Maximum units confirmed by a single acquisition
    pub limit: i64,
    /// Open the sale immediately after initialisation
    #[serde(default)]
    pub enabled: bool,
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Parse "100ms", "30s", "5m", "2h" or a bare number of seconds
    ///
    /// # Errors
    ///
    /// Returns a message if the number is malformed or the duration overflows.
    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            return number(ms).map(Duration::from_millis);
        }
        let (digits, unit_secs) = if let Some(secs) = s.strip_suffix('s') {
            (secs, 1)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, 3600)
        } else {
            (s, 1)
        };
        number(digits)?
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    }

    fn number(digits: &str) -> Result<u64, String> {
        digits
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid duration '{digits}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.debounce.window_minutes, 10);
        assert_eq!(config.health.probe_ttl, Duration::from_secs(1));
    }

    #[test]
    fn humantime_parses_all_suffixes() {
        assert_eq!(humantime_serde::parse("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(humantime_serde::parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(humantime_serde::parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(humantime_serde::parse("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(humantime_serde::parse("7").unwrap(), Duration::from_secs(7));
        assert!(humantime_serde::parse("soon").is_err());
    }

    #[test]
    fn humantime_rejects_overflow() {
        assert!(humantime_serde::parse("400000000000000000m").is_err());
        assert!(humantime_serde::parse("400000000000000000h").is_err());
        assert_eq!(
            humantime_serde::parse("18446744073709551615s").unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn load_reports_oversized_duration_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatekeeper.yaml");
        std::fs::write(&path, "store:\n  sweep_interval: 400000000000000000h\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_bounds_probe_wait() {
        // GIVEN: a probe TTL too large to sleep on
        let mut config = Config::default();
        config.health.probe_ttl = Duration::MAX;
        // THEN: rejected before any probe runs
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.health.probe_margin = MAX_PROBE_WAIT + Duration::from_secs(1);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.health.probe_ttl = MAX_PROBE_WAIT;
        config.health.probe_margin = MAX_PROBE_WAIT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = r#"
store:
  sweep_interval: 250ms
lock:
  default_ttl: 10s
  retry:
    max_attempts: 2
debounce:
  window_minutes: 3
flashsale:
  items:
    - item_id: X
      total: 100
      limit: 10
      enabled: true
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.store.sweep_interval, Duration::from_millis(250));
        assert_eq!(config.lock.default_ttl, Duration::from_secs(10));
        assert_eq!(config.lock.retry.max_attempts, 2);
        // Unspecified fields keep their defaults
        assert!(config.lock.retry.enabled);
        assert_eq!(config.debounce.window_minutes, 3);
        assert_eq!(config.flashsale.items.len(), 1);
        assert!(config.flashsale.items[0].enabled);
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatekeeper.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "health:\n  interval: 5s\n  unhealthy_threshold: 1").unwrap();
        drop(f);

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.health.interval, Duration::from_secs(5));
        assert_eq!(config.health.unhealthy_threshold, 1);
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/gatekeeper.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_rejects_negative_inventory() {
        let mut config = Config::default();
        config.flashsale.items.push(FlashsaleItemConfig {
            item_id: "bad".into(),
            total: -1,
            limit: 5,
            enabled: false,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_sweep_interval() {
        let mut config = Config::default();
        config.store.sweep_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_serializes_round_unit() {
        let config = StoreConfig {
            sweep_interval: Duration::from_millis(1500),
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("1500ms"));
    }
}
