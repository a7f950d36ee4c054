//! Configuration loading.
//!
//! Everything is read once from the environment and threaded into the codec;
//! nothing here is consulted at signal time.
//!
//! | variable | default |
//! |---|---|
//! | `FAIRQ_SIGNAL_PREFIX` | empty (signals off) |
//! | `FAIRQ_SIGNAL_DATABASE` | `0` |
//! | `REDIS_URL` | `redis://localhost:6379` |
//! | `FAIRQ_REDIS_CONNECTIONS` | none (`name=url,name=url`) |
//! | `FAIRQ_STORE_TIMEOUT_MS` | `1000` |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fairq_payload::{
    CommandRegistry, DatabaseSelector, FairnessSignals, ListStore, PayloadCodec, SignalSettings,
};

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 1000;

const SIGNAL_PREFIX: &str = "FAIRQ_SIGNAL_PREFIX";
const SIGNAL_DATABASE: &str = "FAIRQ_SIGNAL_DATABASE";
const REDIS_URL: &str = "REDIS_URL";
const REDIS_CONNECTIONS: &str = "FAIRQ_REDIS_CONNECTIONS";
const STORE_TIMEOUT_MS: &str = "FAIRQ_STORE_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Process configuration for the payload envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub signals: SignalSettings,
    pub redis_url: String,
    /// Named Redis connections selectable by `DatabaseSelector::Name`.
    pub redis_connections: BTreeMap<String, String>,
    pub store_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signals: SignalSettings::disabled(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            redis_connections: BTreeMap::new(),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(prefix) = lookup(SIGNAL_PREFIX) {
            config.signals.key_prefix = prefix;
        }

        if let Some(database) = lookup(SIGNAL_DATABASE).filter(|v| !v.trim().is_empty()) {
            config.signals.database = database
                .parse::<DatabaseSelector>()
                .map_err(|e| ConfigError::invalid(SIGNAL_DATABASE, e.to_string()))?;
        }

        if let Some(url) = lookup(REDIS_URL).filter(|v| !v.is_empty()) {
            config.redis_url = url;
        }

        if let Some(connections) = lookup(REDIS_CONNECTIONS) {
            config.redis_connections = parse_connections(&connections)?;
        }

        if let Some(timeout) = lookup(STORE_TIMEOUT_MS) {
            let ms = timeout
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::invalid(STORE_TIMEOUT_MS, e.to_string()))?;
            if ms == 0 {
                return Err(ConfigError::invalid(STORE_TIMEOUT_MS, "must be positive"));
            }
            config.store_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Codec with the default registry and signals bound to `store`.
    pub fn payload_codec(&self, store: Arc<dyn ListStore>) -> PayloadCodec {
        self.payload_codec_with(CommandRegistry::with_defaults(), store)
    }

    pub fn payload_codec_with(
        &self,
        registry: CommandRegistry,
        store: Arc<dyn ListStore>,
    ) -> PayloadCodec {
        PayloadCodec::new(registry, FairnessSignals::new(self.signals.clone(), store))
    }

    /// Redis-backed store built from `redis_url` and the named connections.
    #[cfg(feature = "redis")]
    pub fn redis_store(&self) -> Result<crate::RedisListStore, fairq_payload::StoreError> {
        let mut store = crate::RedisListStore::new(&self.redis_url, self.store_timeout)?;
        for (name, url) in &self.redis_connections {
            store = store.with_connection(name.clone(), url)?;
        }
        Ok(store)
    }
}

fn parse_connections(value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut connections = BTreeMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, url) = entry.split_once('=').ok_or_else(|| {
            ConfigError::invalid(REDIS_CONNECTIONS, format!("expected name=url, got `{entry}`"))
        })?;
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            return Err(ConfigError::invalid(
                REDIS_CONNECTIONS,
                format!("empty name or url in `{entry}`"),
            ));
        }
        connections.insert(name.to_string(), url.to_string());
    }
    Ok(connections)
}
