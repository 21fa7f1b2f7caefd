//! Kernel configuration structures.
//!
//! Everything has a default matching the stock deployment, so an empty JSON
//! object `{}` is a valid configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;

/// Environment variable naming a JSON config file.
pub const CONFIG_PATH_ENV: &str = "CRAFTKERNEL_CONFIG";
/// Prefix for per-pool worker count overrides, e.g. `CRAFTKERNEL_POOL_IO=8`.
pub const POOL_ENV_PREFIX: &str = "CRAFTKERNEL_POOL_";

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Fixed number of workers; pools are never resized.
    pub workers: usize,
    /// Optional stack size for worker threads, in bytes.
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Pool with `workers` workers and the default stack size.
    #[must_use]
    pub const fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            stack_size: None,
        }
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero worker count or a stack
    /// smaller than 64 KiB.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be greater than 0".into()));
        }
        if let Some(stack) = self.stack_size {
            if stack < 64 * 1024 {
                return Err(ConfigError::Invalid(format!(
                    "stack_size {stack} is below the 64 KiB minimum"
                )));
            }
        }
        Ok(())
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the recent-events ring.
    pub history_capacity: usize,
    /// Capacity of the deferred redelivery queue.
    pub queue_capacity: usize,
    /// Events redelivered per `process_pending` call.
    pub batch_size: usize,
    /// Patterns (Lua dialect) naming dispatch-only events.
    pub transient_patterns: Vec<String>,
    /// Substrings that make a listener failure visible on stderr.
    pub surface_keywords: Vec<String>,
    /// History entries older than this are dropped by `cleanup`.
    pub history_window_secs: u64,
    /// Per-name counters above this are reset by `cleanup`.
    pub counter_overflow: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            queue_capacity: 50,
            batch_size: 10,
            transient_patterns: vec![
                "^input%.".into(),
                "^ui%.tick".into(),
                "^ui%.render".into(),
                "^ui%.refresh".into(),
                "^log%.trace".into(),
                "^log%.debug".into(),
            ],
            surface_keywords: vec!["error".into(), "fail".into()],
            history_window_secs: 300,
            counter_overflow: 100_000,
        }
    }
}

impl BusConfig {
    /// Validate bus configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero batch size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("bus batch_size must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Time wheel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    /// Number of slots; one revolution is `slot_count` ticks.
    pub slot_count: usize,
    /// Milliseconds per tick.
    pub tick_millis: u64,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            slot_count: 60,
            tick_millis: 1000,
        }
    }
}

impl WheelConfig {
    /// Validate wheel configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero slots or a zero tick.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_count == 0 {
            return Err(ConfigError::Invalid("wheel slot_count must be greater than 0".into()));
        }
        if self.tick_millis == 0 {
            return Err(ConfigError::Invalid("wheel tick_millis must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Event-queue pump configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    /// Milliseconds between `process_pending` calls.
    pub interval_millis: u64,
    /// Seconds between bus `cleanup` passes, scheduled on the wheel.
    pub cleanup_every_secs: u64,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            interval_millis: 50,
            cleanup_every_secs: 60,
        }
    }
}

/// Root kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Map of pool name to configuration.
    pub pools: BTreeMap<String, PoolConfig>,
    /// Event bus settings.
    pub bus: BusConfig,
    /// Time wheel settings.
    pub wheel: WheelConfig,
    /// Event pump settings.
    pub pump: PumpConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        let pools = [
            ("io", 4),
            ("index", 2),
            ("ui", 2),
            ("net", 2),
            ("api", 2),
            ("stats", 1),
            ("tests", 2),
            ("sound", 1),
        ]
        .into_iter()
        .map(|(name, workers)| (name.to_string(), PoolConfig::with_workers(workers)))
        .collect();

        Self {
            pools,
            bus: BusConfig::default(),
            wheel: WheelConfig::default(),
            pump: PumpConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Validate all sections and ensure at least one pool exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pools.is_empty() {
            return Err(ConfigError::Invalid("at least one pool must be defined".into()));
        }
        for (name, pool) in &self.pools {
            pool.validate()
                .map_err(|e| ConfigError::Invalid(format!("pool `{name}` invalid: {e}")))?;
        }
        self.bus.validate()?;
        self.wheel.validate()?;
        if self.pump.interval_millis == 0 {
            return Err(ConfigError::Invalid("pump interval_millis must be greater than 0".into()));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`], [`ConfigError::Parse`] or
    /// [`ConfigError::Invalid`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Load configuration from the environment.
    ///
    /// Reads `.env` if present, starts from the file named by
    /// [`CONFIG_PATH_ENV`] (or the defaults), then applies
    /// `CRAFTKERNEL_POOL_<NAME>=<workers>` overrides.
    ///
    /// # Errors
    ///
    /// Returns any file, parse or validation error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(std::env::vars())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `CRAFTKERNEL_POOL_<NAME>=<workers>` pairs; other keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a worker count does not parse.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(pool) = key.strip_prefix(POOL_ENV_PREFIX) else {
                continue;
            };
            let workers = value
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::Invalid(format!("{key}: {e}")))?;
            self.pools
                .entry(pool.to_ascii_lowercase())
                .or_default()
                .workers = workers;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = KernelConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pools["io"].workers, 4);
        assert_eq!(cfg.pools["sound"].workers, 1);
        assert_eq!(cfg.wheel.slot_count, 60);
        assert_eq!(cfg.bus.history_capacity, 100);
        assert_eq!(cfg.bus.queue_capacity, 50);
    }

    #[test]
    fn test_overrides() {
        let mut cfg = KernelConfig::default();
        cfg.apply_overrides(vec![
            ("CRAFTKERNEL_POOL_IO".to_string(), "8".to_string()),
            ("CRAFTKERNEL_POOL_MINING".to_string(), " 3 ".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ])
        .unwrap();
        assert_eq!(cfg.pools["io"].workers, 8);
        assert_eq!(cfg.pools["mining"].workers, 3);

        let err = cfg.apply_overrides(vec![(
            "CRAFTKERNEL_POOL_IO".to_string(),
            "many".to_string(),
        )]);
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }
}
