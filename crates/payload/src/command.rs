//! Job command model: the object serialized at `data.command`.
//!
//! Known wrapper shapes are a closed enum; everything else lands in
//! [`JobCommand::Other`], either as a [`GenericJob`] or as a custom type
//! registered on the [`CommandRegistry`](crate::CommandRegistry).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use fairq_core::{PayloadError, PayloadResult};

/// Class discriminator of a broadcast event wrapper.
pub const BROADCAST_EVENT: &str = "broadcast_event";
/// Class discriminator of a queued event listener invocation.
pub const QUEUED_LISTENER: &str = "queued_listener";
/// Class discriminator of a queued mailable.
pub const QUEUED_MAILABLE: &str = "queued_mailable";
/// Class discriminator of a queued notification.
pub const QUEUED_NOTIFICATION: &str = "queued_notification";
/// Class discriminator of a fair-signal job.
pub const FAIR_SIGNAL_JOB: &str = "fair_signal_job";

/// Key carrying the class discriminator inside a serialized command.
pub const CLASS_KEY: &str = "class";

/// A job that can be carried inside a payload.
///
/// `tags` is the job's own tag-reporting capability; jobs without tags keep
/// the default.
pub trait QueuedJob: core::fmt::Debug + Send + Sync {
    /// Class discriminator this job was decoded from.
    fn class(&self) -> &str;

    fn tags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Payload `type` classification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Broadcast,
    Event,
    Mail,
    Notification,
    Job,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Broadcast => "broadcast",
            JobType::Event => "event",
            JobType::Mail => "mail",
            JobType::Notification => "notification",
            JobType::Job => "job",
        }
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a persisted model; tags as `"{class}:{id}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    pub class: String,
    pub id: Value,
}

impl ModelRef {
    pub fn new(class: impl Into<String>, id: impl Into<Value>) -> Self {
        Self {
            class: class.into(),
            id: id.into(),
        }
    }

    pub fn tag(&self) -> String {
        format!("{}:{}", self.class, scalar_text(&self.id))
    }
}

/// The object a wrapper job acts on (event, mailable, notification, ...).
///
/// Explicit `tags` win; otherwise tags come from the referenced `models`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelRef>,
}

impl JobTarget {
    pub fn named(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_model(mut self, model: ModelRef) -> Self {
        self.models.push(model);
        self
    }

    pub fn has_explicit_tags(&self) -> bool {
        self.tags.is_some()
    }

    pub fn tags(&self) -> Vec<String> {
        match &self.tags {
            Some(tags) => tags.clone(),
            None => self.models.iter().map(ModelRef::tag).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub event: JobTarget,
}

impl QueuedJob for BroadcastEvent {
    fn class(&self) -> &str {
        BROADCAST_EVENT
    }

    fn tags(&self) -> Vec<String> {
        self.event.tags()
    }
}

/// A listener invoked with an event. Listener tags, when set, replace the
/// event-derived ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedListener {
    pub listener: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub event: JobTarget,
}

impl QueuedJob for QueuedListener {
    fn class(&self) -> &str {
        QUEUED_LISTENER
    }

    fn tags(&self) -> Vec<String> {
        match &self.tags {
            Some(tags) => tags.clone(),
            None => self.event.tags(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mailable {
    pub mailable: JobTarget,
}

impl QueuedJob for Mailable {
    fn class(&self) -> &str {
        QUEUED_MAILABLE
    }

    fn tags(&self) -> Vec<String> {
        self.mailable.tags()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification: JobTarget,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifiables: Vec<ModelRef>,
}

impl QueuedJob for Notification {
    fn class(&self) -> &str {
        QUEUED_NOTIFICATION
    }

    fn tags(&self) -> Vec<String> {
        if self.notification.has_explicit_tags() {
            return self.notification.tags();
        }
        let mut tags = self.notification.tags();
        tags.extend(self.notifiables.iter().map(ModelRef::tag));
        tags
    }
}

/// A job whose consumption is tracked per `(queue, partition)`.
///
/// Routing fields are optional on the wire; a missing one is reported when a
/// signal is emitted, not at decode time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FairSignalJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<Value>,
    #[serde(flatten)]
    pub target: JobTarget,
}

impl FairSignalJob {
    pub fn new(queue: impl Into<String>, partition: impl Into<Value>) -> Self {
        Self {
            queue: Some(queue.into()),
            partition: Some(partition.into()),
            target: JobTarget::default(),
        }
    }

    pub fn queue(&self) -> PayloadResult<&str> {
        self.queue
            .as_deref()
            .ok_or(PayloadError::FairSignalJobMalformed("queue"))
    }

    /// Partition rendered for the list key. Strings and numbers only.
    pub fn partition(&self) -> PayloadResult<String> {
        match &self.partition {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(PayloadError::FairSignalJobMalformed("partition")),
        }
    }

    /// `"{prefix}{queue}:{partition}"`.
    pub fn signal_key(&self, prefix: &str) -> PayloadResult<String> {
        Ok(format!("{prefix}{}:{}", self.queue()?, self.partition()?))
    }
}

impl QueuedJob for FairSignalJob {
    fn class(&self) -> &str {
        FAIR_SIGNAL_JOB
    }

    fn tags(&self) -> Vec<String> {
        self.target.tags()
    }
}

/// Fallback for command classes nobody registered.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericJob {
    pub class: String,
    pub target: JobTarget,
}

impl QueuedJob for GenericJob {
    fn class(&self) -> &str {
        &self.class
    }

    fn tags(&self) -> Vec<String> {
        self.target.tags()
    }
}

/// The deserialized `data.command`.
#[derive(Debug)]
pub enum JobCommand {
    BroadcastEvent(BroadcastEvent),
    QueuedListener(QueuedListener),
    Mailable(Mailable),
    Notification(Notification),
    FairSignal(FairSignalJob),
    Other(Box<dyn QueuedJob>),
}

impl JobCommand {
    /// Classification written to the payload `type` key.
    pub fn job_type(&self) -> JobType {
        match self {
            JobCommand::BroadcastEvent(_) => JobType::Broadcast,
            JobCommand::QueuedListener(_) => JobType::Event,
            JobCommand::Mailable(_) => JobType::Mail,
            JobCommand::Notification(_) => JobType::Notification,
            JobCommand::FairSignal(_) | JobCommand::Other(_) => JobType::Job,
        }
    }

    pub fn as_job(&self) -> &dyn QueuedJob {
        match self {
            JobCommand::BroadcastEvent(job) => job,
            JobCommand::QueuedListener(job) => job,
            JobCommand::Mailable(job) => job,
            JobCommand::Notification(job) => job,
            JobCommand::FairSignal(job) => job,
            JobCommand::Other(job) => job.as_ref(),
        }
    }

    pub fn class(&self) -> &str {
        self.as_job().class()
    }

    pub fn tags(&self) -> Vec<String> {
        self.as_job().tags()
    }

    pub fn as_fair_signal(&self) -> Option<&FairSignalJob> {
        match self {
            JobCommand::FairSignal(job) => Some(job),
            _ => None,
        }
    }

    pub fn is_fair_signal(&self) -> bool {
        self.as_fair_signal().is_some()
    }
}

impl From<BroadcastEvent> for JobCommand {
    fn from(value: BroadcastEvent) -> Self {
        Self::BroadcastEvent(value)
    }
}

impl From<QueuedListener> for JobCommand {
    fn from(value: QueuedListener) -> Self {
        Self::QueuedListener(value)
    }
}

impl From<Mailable> for JobCommand {
    fn from(value: Mailable) -> Self {
        Self::Mailable(value)
    }
}

impl From<Notification> for JobCommand {
    fn from(value: Notification) -> Self {
        Self::Notification(value)
    }
}

impl From<FairSignalJob> for JobCommand {
    fn from(value: FairSignalJob) -> Self {
        Self::FairSignal(value)
    }
}

/// Serialize a job into the command string stored at `data.command`.
///
/// The job must serialize to a JSON object; `class` is injected into it.
pub fn serialize_command<T: Serialize>(class: &str, job: &T) -> Result<String, serde_json::Error> {
    use serde::ser::Error as _;

    match serde_json::to_value(job)? {
        Value::Object(mut map) => {
            map.insert(CLASS_KEY.to_string(), Value::String(class.to_string()));
            serde_json::to_string(&Value::Object(map))
        }
        _ => Err(serde_json::Error::custom("command must serialize to a JSON object")),
    }
}

pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
