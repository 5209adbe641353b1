//! Configuration types for HotKV
//!
//! Everything here is fixed at startup and injected into the store at
//! construction.

use serde::{Deserialize, Serialize};

/// Root configuration for HotKV
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Record store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Hot-key candidate tracker configuration
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which storage backend holds the records
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// 256 independently locked shards selected by the first key byte
    #[default]
    Partitioned,
    /// One concurrent hash map over the whole keyspace
    Flat,
}

/// How lookups synchronize with shard writers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadLocking {
    /// Lookups take the shard's shared lock
    #[default]
    Shared,
    /// Lookups take no lock; the caller guarantees no concurrent writers
    External,
}

/// Record store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: BackendKind,
    /// Lookup synchronization (partitioned backend only)
    #[serde(default)]
    pub read_locking: ReadLocking,
    /// Count shard accesses for instrumentation
    #[serde(default)]
    pub track_shard_access: bool,
    /// Maximum number of entries kept in a LIST record
    #[serde(default = "default_max_list_len")]
    pub max_list_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            read_locking: ReadLocking::default(),
            track_shard_access: false,
            max_list_len: default_max_list_len(),
        }
    }
}

impl StoreConfig {
    /// Config for the flat backend, everything else default
    #[must_use]
    pub fn flat() -> Self {
        Self {
            backend: BackendKind::Flat,
            ..Default::default()
        }
    }
}

/// Hot-key candidate tracker configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Conflict ratio at or above which a key becomes hot
    #[serde(default = "default_conflict_threshold")]
    pub conflict_threshold: f64,
    /// Accesses required before a key's ratio is trusted
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,
    /// Upper bound on the hot-key index size
    #[serde(default = "default_max_hot_keys")]
    pub max_hot_keys: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            conflict_threshold: default_conflict_threshold(),
            min_samples: default_min_samples(),
            max_hot_keys: default_max_hot_keys(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_list_len() -> usize {
    10
}

fn default_conflict_threshold() -> f64 {
    0.5
}

fn default_min_samples() -> u64 {
    16
}

fn default_max_hot_keys() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.backend, BackendKind::Partitioned);
        assert_eq!(config.store.read_locking, ReadLocking::Shared);
        assert_eq!(config.store.max_list_len, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [store]
            backend = "flat"

            [tracker]
            max_hot_keys = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.store.backend, BackendKind::Flat);
        assert!(!config.store.track_shard_access);
        assert_eq!(config.tracker.max_hot_keys, 8);
        assert_eq!(config.tracker.min_samples, 16);
    }
}
