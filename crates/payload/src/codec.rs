//! Raw payload codec.
//!
//! The raw payload is a JSON object; `decode_document`/`encode_document` are
//! inverse on any object they produce. [`PayloadCodec`] owns the command
//! registry and the signal emitter and builds [`JobPayload`]s.

use std::sync::Arc;

use serde_json::{Map, Value};

use fairq_core::{PayloadError, PayloadResult};

use crate::payload::JobPayload;
use crate::registry::{CommandRegistry, kind_of};
use crate::signal::FairnessSignals;

/// Decoded payload document.
pub type Document = Map<String, Value>;

/// Parse `raw` as a JSON object.
pub fn decode_document(raw: &str) -> PayloadResult<Document> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(other) => Err(PayloadError::decode(format!(
            "expected a JSON object, found {}",
            kind_of(&other)
        ))),
        Err(e) => Err(PayloadError::decode(e.to_string())),
    }
}

pub fn encode_document(document: &Document) -> PayloadResult<String> {
    serde_json::to_string(document).map_err(|e| PayloadError::encode(e.to_string()))
}

/// Resolve a dot-separated path (`data.commandName`).
///
/// Numeric segments index into arrays. Any missing segment yields `None`.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Builds envelopes with a fixed registry and signal configuration.
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    registry: Arc<CommandRegistry>,
    signals: Arc<FairnessSignals>,
}

impl PayloadCodec {
    pub fn new(registry: CommandRegistry, signals: FairnessSignals) -> Self {
        Self {
            registry: Arc::new(registry),
            signals: Arc::new(signals),
        }
    }

    /// Default registry, signals off.
    pub fn without_signals() -> Self {
        Self::new(CommandRegistry::with_defaults(), FairnessSignals::disabled())
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn signals(&self) -> &FairnessSignals {
        &self.signals
    }

    pub fn decode(&self, raw: impl Into<String>) -> PayloadResult<JobPayload> {
        JobPayload::decode(raw, &self.registry, Arc::clone(&self.signals))
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::without_signals()
    }
}
