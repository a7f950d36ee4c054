//! Fairness signals: identities of fair-signal jobs pushed onto per
//! `(queue, partition)` lists in an external store.
//!
//! ## Delivery
//!
//! Signals are **at-least-once**: every identity lookup through
//! [`JobPayload::id`](crate::JobPayload::id) pushes again. Consumers of the
//! list must tolerate duplicates.
//!
//! ## Failure policy
//!
//! - Empty key prefix: the feature is off, zero store interaction.
//! - Prefix set but the store cannot be reached: `StoreUnavailable`.
//! - Fair-signal job without `queue`/`partition`: `FairSignalJobMalformed`.

use core::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use fairq_core::{JobId, PayloadError, PayloadResult};

use crate::command::JobCommand;

/// Which logical database of the store holds the signal lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatabaseSelector {
    /// Numeric logical database (e.g. Redis `SELECT n`).
    Index(i64),
    /// Named connection.
    Name(String),
}

impl Default for DatabaseSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl core::fmt::Display for DatabaseSelector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DatabaseSelector::Index(index) => write!(f, "{index}"),
            DatabaseSelector::Name(name) => f.write_str(name),
        }
    }
}

impl FromStr for DatabaseSelector {
    type Err = StoreError;

    /// All-digit text selects an index; anything else names a connection.
    /// Signed numbers are rejected rather than taken as names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StoreError::Connection("empty database selector".to_string()));
        }

        let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
        if !unsigned.is_empty() && unsigned.bytes().all(|b| b.is_ascii_digit()) {
            if unsigned.len() != s.len() {
                return Err(StoreError::Connection(format!(
                    "database index must be unsigned, got `{s}`"
                )));
            }
            return s
                .parse::<i64>()
                .map(Self::Index)
                .map_err(|e| StoreError::Connection(format!("database index `{s}`: {e}")));
        }
        Ok(Self::Name(s.to_string()))
    }
}

impl From<i64> for DatabaseSelector {
    fn from(value: i64) -> Self {
        Self::Index(value)
    }
}

impl From<&str> for DatabaseSelector {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

/// Store adapter failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<StoreError> for PayloadError {
    fn from(value: StoreError) -> Self {
        PayloadError::store(value.to_string())
    }
}

/// Handle on one logical database of an ordered-list store.
pub trait ListStoreHandle {
    /// Push `value` onto the head of the list at `key`.
    fn push_head(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Ordered-list store reachable by database selector.
///
/// Handles are acquired per signal and dropped right after the push.
pub trait ListStore: Send + Sync {
    fn connection(
        &self,
        database: &DatabaseSelector,
    ) -> Result<Box<dyn ListStoreHandle + '_>, StoreError>;
}

impl<S> ListStore for Arc<S>
where
    S: ListStore + ?Sized,
{
    fn connection(
        &self,
        database: &DatabaseSelector,
    ) -> Result<Box<dyn ListStoreHandle + '_>, StoreError> {
        (**self).connection(database)
    }
}

/// Signal configuration, threaded in at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSettings {
    /// List key prefix; empty disables signals.
    pub key_prefix: String,
    pub database: DatabaseSelector,
}

impl SignalSettings {
    pub fn new(key_prefix: impl Into<String>, database: impl Into<DatabaseSelector>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            database: database.into(),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.key_prefix.is_empty()
    }
}

/// What an emission attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Feature off, no job, or not a fair-signal job.
    Skipped,
    /// Identity pushed onto `key`.
    Pushed { key: String },
}

/// Fairness signal emitter.
#[derive(Clone, Default)]
pub struct FairnessSignals {
    settings: SignalSettings,
    store: Option<Arc<dyn ListStore>>,
}

impl FairnessSignals {
    pub fn new(settings: SignalSettings, store: Arc<dyn ListStore>) -> Self {
        Self {
            settings,
            store: Some(store),
        }
    }

    /// Emitter that never touches a store.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Settings without a store; emitting with a prefix set fails.
    pub fn unbound(settings: SignalSettings) -> Self {
        Self {
            settings,
            store: None,
        }
    }

    pub fn settings(&self) -> &SignalSettings {
        &self.settings
    }

    /// Push `id` for `job` if it is a fair-signal job and signals are enabled.
    pub fn emit(&self, job: Option<&JobCommand>, id: &JobId) -> PayloadResult<SignalOutcome> {
        if !self.settings.is_enabled() {
            return Ok(SignalOutcome::Skipped);
        }

        let Some(fair) = job.and_then(JobCommand::as_fair_signal) else {
            debug!(job_id = %id, "not a fair-signal job; no signal");
            return Ok(SignalOutcome::Skipped);
        };

        let key = fair.signal_key(&self.settings.key_prefix)?;

        let store = self.store.as_ref().ok_or_else(|| {
            warn!(job_id = %id, key = %key, "signal prefix configured without a store");
            PayloadError::store("no signal store configured")
        })?;

        let mut handle = store.connection(&self.settings.database).map_err(|e| {
            warn!(
                job_id = %id,
                database = %self.settings.database,
                error = %e,
                "signal store unreachable"
            );
            PayloadError::from(e)
        })?;

        handle.push_head(&key, id.as_str()).map_err(|e| {
            warn!(job_id = %id, key = %key, error = %e, "signal push failed");
            PayloadError::from(e)
        })?;

        debug!(job_id = %id, key = %key, "fairness signal recorded");
        Ok(SignalOutcome::Pushed { key })
    }
}

impl core::fmt::Debug for FairnessSignals {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FairnessSignals")
            .field("settings", &self.settings)
            .field("store", &self.store.as_ref().map(|_| "<list store>"))
            .finish()
    }
}
