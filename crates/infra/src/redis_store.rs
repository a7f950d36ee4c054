//! Redis-backed signal list store (optional).
//!
//! - **Index selectors** reuse the default URL with a different logical DB
//! - **Name selectors** pick a named connection URL
//! - One short-lived connection per signal, bounded by the store timeout

use std::collections::HashMap;
use std::time::Duration;

use redis::{ConnectionInfo, IntoConnectionInfo};
use tracing::instrument;

use fairq_payload::{DatabaseSelector, ListStore, ListStoreHandle, StoreError};

#[derive(Debug, Clone)]
pub struct RedisListStore {
    default: ConnectionInfo,
    named: HashMap<String, ConnectionInfo>,
    timeout: Duration,
}

impl RedisListStore {
    /// Create a store for `redis_url` (e.g. "redis://localhost:6379").
    ///
    /// No connection is opened here.
    pub fn new(redis_url: impl AsRef<str>, timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            default: parse_url(redis_url.as_ref())?,
            named: HashMap::new(),
            timeout,
        })
    }

    /// Register a named connection for `DatabaseSelector::Name`.
    pub fn with_connection(
        mut self,
        name: impl Into<String>,
        redis_url: impl AsRef<str>,
    ) -> Result<Self, StoreError> {
        self.named.insert(name.into(), parse_url(redis_url.as_ref())?);
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn connection_info(&self, database: &DatabaseSelector) -> Result<ConnectionInfo, StoreError> {
        match database {
            DatabaseSelector::Index(index) => {
                let mut info = self.default.clone();
                info.redis.db = *index;
                Ok(info)
            }
            DatabaseSelector::Name(name) => self
                .named
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::Connection(format!("unknown redis connection `{name}`"))),
        }
    }
}

impl ListStore for RedisListStore {
    fn connection(
        &self,
        database: &DatabaseSelector,
    ) -> Result<Box<dyn ListStoreHandle + '_>, StoreError> {
        let info = self.connection_info(database)?;
        let client = redis::Client::open(info).map_err(classify)?;

        let conn = client
            .get_connection_with_timeout(self.timeout)
            .map_err(classify)?;
        conn.set_read_timeout(Some(self.timeout)).map_err(classify)?;
        conn.set_write_timeout(Some(self.timeout)).map_err(classify)?;

        Ok(Box::new(RedisListHandle {
            conn,
            database: database.clone(),
        }))
    }
}

struct RedisListHandle {
    conn: redis::Connection,
    database: DatabaseSelector,
}

impl ListStoreHandle for RedisListHandle {
    #[instrument(skip(self, value), fields(database = %self.database), err)]
    fn push_head(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let _: i64 = redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query(&mut self.conn)
            .map_err(classify)?;
        Ok(())
    }
}

fn parse_url(url: &str) -> Result<ConnectionInfo, StoreError> {
    url.into_connection_info()
        .map_err(|e| StoreError::Connection(format!("invalid redis url: {e}")))
}

fn classify(e: redis::RedisError) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout(e.to_string())
    } else if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}
