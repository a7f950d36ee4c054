//! Infrastructure layer: configuration and signal store adapters.

pub mod config;

#[cfg(feature = "redis")]
pub mod redis_store;

#[cfg(feature = "redis")]
pub use redis_store::RedisListStore;

pub use config::{Config, ConfigError};
