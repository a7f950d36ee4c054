//! Command deserialization registry.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use fairq_core::{PayloadError, PayloadResult};

use crate::command::{
    BROADCAST_EVENT, CLASS_KEY, FAIR_SIGNAL_JOB, GenericJob, JobCommand, JobTarget, QUEUED_LISTENER,
    QUEUED_MAILABLE, QUEUED_NOTIFICATION, QueuedJob,
};

type Decoder = Box<dyn Fn(Value) -> Result<JobCommand, serde_json::Error> + Send + Sync>;

/// Maps command class discriminators to decoders.
///
/// `with_defaults()` knows the five built-in wrappers. Unknown classes decode
/// to a [`GenericJob`]; `register` adds typed custom jobs.
pub struct CommandRegistry {
    decoders: HashMap<String, Decoder>,
}

impl CommandRegistry {
    /// Registry with no decoders; every class becomes a [`GenericJob`].
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register_with(BROADCAST_EVENT, |v| {
                Ok(JobCommand::BroadcastEvent(serde_json::from_value(v)?))
            })
            .register_with(QUEUED_LISTENER, |v| {
                Ok(JobCommand::QueuedListener(serde_json::from_value(v)?))
            })
            .register_with(QUEUED_MAILABLE, |v| {
                Ok(JobCommand::Mailable(serde_json::from_value(v)?))
            })
            .register_with(QUEUED_NOTIFICATION, |v| {
                Ok(JobCommand::Notification(serde_json::from_value(v)?))
            })
            .register_with(FAIR_SIGNAL_JOB, |v| {
                Ok(JobCommand::FairSignal(serde_json::from_value(v)?))
            });
        registry
    }

    /// Register a typed job; it decodes into [`JobCommand::Other`].
    pub fn register<J>(&mut self, class: impl Into<String>) -> &mut Self
    where
        J: QueuedJob + DeserializeOwned + 'static,
    {
        self.register_with(class, |v| {
            let job: J = serde_json::from_value(v)?;
            Ok(JobCommand::Other(Box::new(job)))
        })
    }

    /// Register a raw decoder. Replaces any decoder already bound to `class`.
    pub fn register_with<F>(&mut self, class: impl Into<String>, decoder: F) -> &mut Self
    where
        F: Fn(Value) -> Result<JobCommand, serde_json::Error> + Send + Sync + 'static,
    {
        self.decoders.insert(class.into(), Box::new(decoder));
        self
    }

    pub fn contains(&self, class: &str) -> bool {
        self.decoders.contains_key(class)
    }

    /// Decode the value found at `data.command`.
    ///
    /// The value must be a string holding a JSON object with a `class`
    /// discriminator, or the literal `null` (no job).
    pub fn decode(&self, command: &Value) -> PayloadResult<Option<JobCommand>> {
        let text = match command {
            Value::String(text) => text,
            other => {
                return Err(PayloadError::job(format!(
                    "command must be a serialized string, found {}",
                    kind_of(other)
                )));
            }
        };

        let parsed: Value = serde_json::from_str(text)
            .map_err(|e| PayloadError::job(format!("command is not valid JSON: {e}")))?;

        match parsed {
            Value::Null => Ok(None),
            Value::Object(fields) => self.decode_object(fields).map(Some),
            other => Err(PayloadError::job(format!(
                "command must be an object, found {}",
                kind_of(&other)
            ))),
        }
    }

    fn decode_object(&self, mut fields: Map<String, Value>) -> PayloadResult<JobCommand> {
        let class = match fields.remove(CLASS_KEY) {
            Some(Value::String(class)) => class,
            _ => return Err(PayloadError::job("command has no `class` discriminator")),
        };

        match self.decoders.get(&class) {
            Some(decoder) => decoder(Value::Object(fields))
                .map_err(|e| PayloadError::job(format!("{class}: {e}"))),
            None => {
                let target: JobTarget = serde_json::from_value(Value::Object(fields))
                    .map_err(|e| PayloadError::job(format!("{class}: {e}")))?;
                Ok(JobCommand::Other(Box::new(GenericJob { class, target })))
            }
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl core::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut classes: Vec<_> = self.decoders.keys().collect();
        classes.sort();
        f.debug_struct("CommandRegistry")
            .field("classes", &classes)
            .finish()
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
