//! The job payload envelope.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use fairq_core::{JobId, PayloadError, PayloadResult};

use crate::codec::{Document, decode_document, encode_document, lookup};
use crate::command::{JobCommand, JobType};
use crate::registry::CommandRegistry;
use crate::signal::{FairnessSignals, SignalOutcome};

/// What the producer hands to [`JobPayload::prepare`].
#[derive(Debug, Clone, Copy)]
pub enum Dispatchable<'a> {
    Command(&'a JobCommand),
    /// A bare job handle (class name); no tags can be derived from it.
    Handle(&'a str),
}

impl Dispatchable<'_> {
    pub fn job_type(&self) -> JobType {
        match self {
            Dispatchable::Command(job) => job.job_type(),
            Dispatchable::Handle(_) => JobType::Job,
        }
    }

    pub fn tags(&self) -> Vec<String> {
        match self {
            Dispatchable::Command(job) => job.tags(),
            Dispatchable::Handle(_) => Vec::new(),
        }
    }
}

impl<'a> From<&'a JobCommand> for Dispatchable<'a> {
    fn from(value: &'a JobCommand) -> Self {
        Self::Command(value)
    }
}

impl<'a> From<&'a str> for Dispatchable<'a> {
    fn from(value: &'a str) -> Self {
        Self::Handle(value)
    }
}

/// Envelope around one queued job's raw payload.
///
/// Notes:
/// - `raw` always equals the encoding of `decoded`; every mutation re-encodes
///   and commits both or neither.
/// - `job` is decoded once from `data.command` and never re-derived.
/// - Not synchronized; one envelope per thread of work.
#[derive(Debug)]
pub struct JobPayload {
    raw: String,
    decoded: Document,
    job: Option<JobCommand>,
    signals: Arc<FairnessSignals>,
}

impl JobPayload {
    /// Decode `raw` and its embedded command.
    ///
    /// Fails with `Decode` when `raw` is not a JSON object and with
    /// `JobDeserialization` when `data.command` is absent or unusable.
    pub fn decode(
        raw: impl Into<String>,
        registry: &CommandRegistry,
        signals: Arc<FairnessSignals>,
    ) -> PayloadResult<Self> {
        let raw = raw.into();
        let decoded = decode_document(&raw)?;

        let command = lookup(&decoded, "data.command")
            .ok_or_else(|| PayloadError::job("payload has no `data.command`"))?;
        let job = registry.decode(command)?;

        Ok(Self {
            raw,
            decoded,
            job,
            signals,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn into_raw(self) -> String {
        self.raw
    }

    pub fn decoded(&self) -> &Document {
        &self.decoded
    }

    pub fn job(&self) -> Option<&JobCommand> {
        self.job.as_ref()
    }

    /// Dot-path lookup against the decoded document.
    pub fn field(&self, path: &str) -> Option<&Value> {
        lookup(&self.decoded, path)
    }

    pub fn command_name(&self) -> Option<&str> {
        self.field("data.commandName").and_then(Value::as_str)
    }

    /// The serialized command string.
    pub fn command(&self) -> Option<&str> {
        self.field("data.command").and_then(Value::as_str)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.field("displayName").and_then(Value::as_str)
    }

    /// Tags stored in the payload; non-string entries are skipped.
    pub fn tags(&self) -> Vec<String> {
        match self.decoded.get("tags") {
            Some(Value::Array(tags)) => tags
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_retry(&self) -> bool {
        self.decoded.get("retry_of").is_some_and(|v| !v.is_null())
    }

    pub fn retry_of(&self) -> Option<&str> {
        self.decoded.get("retry_of").and_then(Value::as_str)
    }

    pub fn pushed_at(&self) -> Option<&str> {
        self.decoded.get("pushedAt").and_then(Value::as_str)
    }

    /// The `type` written by [`prepare`](Self::prepare), if any.
    pub fn job_type(&self) -> Option<&str> {
        self.decoded.get("type").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.decoded.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.decoded.contains_key(key)
    }

    /// Set one top-level key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> PayloadResult<&mut Self> {
        self.set([(key.into(), value)])
    }

    /// Remove one top-level key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> PayloadResult<Option<Value>> {
        let mut candidate = self.decoded.clone();
        let removed = candidate.remove(key);
        self.commit(candidate)?;
        Ok(removed)
    }

    /// Shallow-merge `patch` into the document and re-encode.
    ///
    /// Either the whole patch lands or nothing changes.
    pub fn set<I, K>(&mut self, patch: I) -> PayloadResult<&mut Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut candidate = self.decoded.clone();
        for (key, value) in patch {
            candidate.insert(key.into(), value);
        }
        self.commit(candidate)?;
        Ok(self)
    }

    /// Annotate the payload before it is pushed: `type`, `tags`, `pushedAt`.
    pub fn prepare(&mut self, job: Option<Dispatchable<'_>>) -> PayloadResult<&mut Self> {
        self.prepare_at(job, Utc::now())
    }

    pub fn prepare_at(
        &mut self,
        job: Option<Dispatchable<'_>>,
        now: DateTime<Utc>,
    ) -> PayloadResult<&mut Self> {
        let job_type = job.map(|j| j.job_type()).unwrap_or(JobType::Job);
        let tags = self.merged_tags(job);

        self.set([
            ("type", Value::String(job_type.as_str().to_string())),
            ("tags", Value::Array(tags)),
            ("pushedAt", Value::String(pushed_at_timestamp(now))),
        ])
    }

    /// Job identity: `uuid`, else `id`. Does not emit signals.
    pub fn identity(&self) -> PayloadResult<JobId> {
        ["uuid", "id"]
            .into_iter()
            .find_map(|key| match self.decoded.get(key) {
                Some(Value::String(s)) => Some(JobId::new(s.as_str())),
                Some(Value::Number(n)) => Some(JobId::new(n.to_string())),
                _ => None,
            })
            .ok_or(PayloadError::MissingIdentity)
    }

    /// Push `id` onto the fairness list if this is a fair-signal job.
    pub fn record_fairness_signal(&self, id: &JobId) -> PayloadResult<SignalOutcome> {
        self.signals.emit(self.job.as_ref(), id)
    }

    /// Identity lookup with the fairness signal side effect.
    ///
    /// Every call emits (at-least-once). Signal failures are returned; use
    /// [`identity`](Self::identity) for a lookup without side effects.
    pub fn id(&self) -> PayloadResult<JobId> {
        let id = self.identity()?;
        self.record_fairness_signal(&id)?;
        Ok(id)
    }

    fn merged_tags(&self, job: Option<Dispatchable<'_>>) -> Vec<Value> {
        let mut tags = match self.decoded.get("tags") {
            Some(Value::Array(existing)) => existing.clone(),
            _ => Vec::new(),
        };
        for tag in job.map(|j| j.tags()).unwrap_or_default() {
            let tag = Value::String(tag);
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    fn commit(&mut self, candidate: Document) -> PayloadResult<()> {
        let raw = encode_document(&candidate)?;
        self.decoded = candidate;
        self.raw = raw;
        Ok(())
    }
}

/// `"{seconds}.{microseconds}"`, always `.` separated.
pub fn pushed_at_timestamp(now: DateTime<Utc>) -> String {
    format!("{}.{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    use crate::command::{
        FAIR_SIGNAL_JOB, FairSignalJob, JobTarget, Mailable, ModelRef, QUEUED_MAILABLE,
        serialize_command,
    };
    use crate::in_memory_store::InMemoryListStore;
    use crate::signal::{DatabaseSelector, SignalSettings};

    fn mail_command() -> String {
        serialize_command(
            QUEUED_MAILABLE,
            &Mailable {
                mailable: JobTarget::named("WelcomeMail").with_model(ModelRef::new("User", 7)),
            },
        )
        .unwrap()
    }

    fn fair_command(queue: &str, partition: i64) -> String {
        serialize_command(FAIR_SIGNAL_JOB, &FairSignalJob::new(queue, partition)).unwrap()
    }

    fn decode(raw: Value) -> JobPayload {
        JobPayload::decode(
            raw.to_string(),
            &CommandRegistry::with_defaults(),
            Arc::new(FairnessSignals::disabled()),
        )
        .unwrap()
    }

    fn consistent(payload: &JobPayload) -> bool {
        decode_document(payload.raw()).unwrap() == *payload.decoded()
    }

    fn at(secs: i64, micros: u32) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, micros * 1000).unwrap()
    }

    #[test]
    fn accessors_read_metadata() {
        let payload = decode(json!({
            "uuid": "j1",
            "displayName": "App\\Mail\\WelcomeMail",
            "data": {"command": mail_command(), "commandName": "SendQueuedMailable"},
            "tags": ["a", 3, "b"],
            "pushedAt": "1700000000.000001"
        }));

        assert_eq!(payload.display_name(), Some("App\\Mail\\WelcomeMail"));
        assert_eq!(payload.command_name(), Some("SendQueuedMailable"));
        assert_eq!(payload.command(), Some(mail_command().as_str()));
        assert_eq!(payload.tags(), vec!["a", "b"]);
        assert_eq!(payload.pushed_at(), Some("1700000000.000001"));
        assert!(!payload.is_retry());
        assert_eq!(payload.retry_of(), None);
        assert_eq!(payload.job().unwrap().job_type(), JobType::Mail);
    }

    #[test]
    fn missing_tags_are_empty() {
        let payload = decode(json!({"uuid": "j1", "data": {"command": mail_command()}}));
        assert!(payload.tags().is_empty());
        assert_eq!(payload.command_name(), None);
    }

    #[test]
    fn construction_errors_are_distinct() {
        let registry = CommandRegistry::with_defaults();
        let signals = Arc::new(FairnessSignals::disabled());

        let err = JobPayload::decode("{not json", &registry, signals.clone()).unwrap_err();
        assert!(matches!(err, PayloadError::Decode(_)));

        let err = JobPayload::decode(r#"{"uuid":"j1"}"#, &registry, signals.clone()).unwrap_err();
        assert!(matches!(err, PayloadError::JobDeserialization(_)));

        let err = JobPayload::decode(
            r#"{"uuid":"j1","data":{"command":"{\"class\":\"queued_mailable\"}"}}"#,
            &registry,
            signals,
        )
        .unwrap_err();
        assert!(matches!(err, PayloadError::JobDeserialization(_)));
    }

    #[test]
    fn identity_prefers_uuid_then_id() {
        let command = mail_command();

        let payload = decode(json!({"uuid": "u1", "id": "i1", "data": {"command": command}}));
        assert_eq!(payload.id().unwrap(), "u1");

        let payload = decode(json!({"id": "i1", "data": {"command": command}}));
        assert_eq!(payload.id().unwrap(), "i1");

        let payload = decode(json!({"uuid": null, "id": 17, "data": {"command": command}}));
        assert_eq!(payload.id().unwrap(), "17");

        let payload = decode(json!({"data": {"command": command}}));
        assert_eq!(payload.id(), Err(PayloadError::MissingIdentity));
    }

    #[test]
    fn set_merges_shallowly_and_reencodes() {
        let mut payload = decode(json!({
            "uuid": "j1",
            "data": {"command": mail_command(), "commandName": "Mail"},
        }));

        payload
            .set([("displayName", json!("Renamed")), ("data", json!({"x": 1}))])
            .unwrap();

        assert_eq!(payload.display_name(), Some("Renamed"));
        // Top-level only: `data` is replaced wholesale.
        assert_eq!(payload.field("data"), Some(&json!({"x": 1})));
        assert!(consistent(&payload));
        // The decoded job survives the rewrite.
        assert_eq!(payload.job().unwrap().job_type(), JobType::Mail);
    }

    #[test]
    fn insert_and_remove_keep_raw_in_sync() {
        let mut payload = decode(json!({"uuid": "j1", "data": {"command": mail_command()}}));

        payload.insert("retry_of", json!("j0")).unwrap();
        assert!(payload.has("retry_of"));
        assert!(payload.is_retry());
        assert!(consistent(&payload));

        assert_eq!(payload.remove("retry_of").unwrap(), Some(json!("j0")));
        assert!(!payload.has("retry_of"));
        assert_eq!(payload.remove("retry_of").unwrap(), None);
        assert!(consistent(&payload));
        assert_eq!(payload.get("uuid"), Some(&json!("j1")));
    }

    #[test]
    fn prepare_classifies_and_tags_mail_job() {
        let mut payload = decode(json!({
            "uuid": "j1",
            "tags": ["existing"],
            "data": {"command": mail_command()}
        }));
        let job = JobCommand::from(Mailable {
            mailable: JobTarget::default().with_tags(["welcome", "existing"]),
        });

        payload
            .prepare_at(Some(Dispatchable::from(&job)), at(1_700_000_000, 42))
            .unwrap();

        assert_eq!(payload.job_type(), Some("mail"));
        assert_eq!(payload.tags(), vec!["existing", "welcome"]);
        assert_eq!(payload.pushed_at(), Some("1700000000.000042"));
        assert!(consistent(&payload));
    }

    #[test]
    fn prepare_with_string_handle_keeps_only_existing_tags() {
        let mut payload = decode(json!({
            "uuid": "j1",
            "tags": ["t1"],
            "data": {"command": mail_command()}
        }));

        payload
            .prepare(Some(Dispatchable::Handle("App\\Jobs\\Ping")))
            .unwrap();

        assert_eq!(payload.job_type(), Some("job"));
        assert_eq!(payload.tags(), vec!["t1"]);

        payload.prepare(None).unwrap();
        assert_eq!(payload.job_type(), Some("job"));
        assert_eq!(payload.tags(), vec!["t1"]);
    }

    #[test]
    fn prepare_twice_reflects_second_classification() {
        let mut payload = decode(json!({"uuid": "j1", "data": {"command": mail_command()}}));
        let mail = JobCommand::from(Mailable {
            mailable: JobTarget::default().with_tags(["mail-tag"]),
        });
        let fair = JobCommand::from(FairSignalJob {
            target: JobTarget::default().with_tags(["fair-tag"]),
            ..FairSignalJob::new("q1", 3)
        });

        payload.prepare_at(Some((&mail).into()), at(10, 0)).unwrap();
        payload.prepare_at(Some((&fair).into()), at(20, 5)).unwrap();

        assert_eq!(payload.job_type(), Some("job"));
        // First call's tags were persisted into `tags`, so they carry over.
        assert_eq!(payload.tags(), vec!["mail-tag", "fair-tag"]);
        assert_eq!(payload.pushed_at(), Some("20.000005"));
        assert!(consistent(&payload));
    }

    #[test]
    fn pushed_at_uses_dot_separator() {
        assert_eq!(pushed_at_timestamp(at(1_700_000_000, 123_456)), "1700000000.123456");
        assert_eq!(pushed_at_timestamp(at(5, 0)), "5.000000");
    }

    #[test]
    fn scenario_unconfigured_prefix() {
        let store = Arc::new(InMemoryListStore::new());
        let signals = Arc::new(FairnessSignals::new(SignalSettings::disabled(), store.clone()));
        let raw = json!({"uuid": "j1", "data": {"command": mail_command()}}).to_string();

        let payload =
            JobPayload::decode(raw, &CommandRegistry::with_defaults(), signals).unwrap();

        assert_eq!(payload.id().unwrap(), "j1");
        assert_eq!(store.connection_count(), 0);
        assert!(payload.tags().is_empty());
    }

    #[test]
    fn scenario_retry_of_fair_signal_job() {
        let store = Arc::new(InMemoryListStore::new());
        let signals = Arc::new(FairnessSignals::new(SignalSettings::new("fq:", 0), store.clone()));
        let raw = json!({
            "id": "j2",
            "retry_of": "j1",
            "data": {"command": fair_command("q1", 3)}
        })
        .to_string();

        let payload =
            JobPayload::decode(raw, &CommandRegistry::with_defaults(), signals).unwrap();

        assert_eq!(payload.id().unwrap(), "j2");
        assert!(payload.is_retry());
        assert_eq!(payload.retry_of(), Some("j1"));
        assert_eq!(store.connection_count(), 1);
        assert_eq!(store.list(&DatabaseSelector::Index(0), "fq:q1:3"), vec!["j2"]);
        assert_eq!(store.keys(&DatabaseSelector::Index(0)), vec!["fq:q1:3"]);
    }

    #[test]
    fn every_id_call_emits_again() {
        let store = Arc::new(InMemoryListStore::new());
        let signals = Arc::new(FairnessSignals::new(SignalSettings::new("fq:", 0), store.clone()));
        let raw = json!({"uuid": "j3", "data": {"command": fair_command("q1", 3)}}).to_string();
        let payload =
            JobPayload::decode(raw, &CommandRegistry::with_defaults(), signals).unwrap();

        payload.id().unwrap();
        payload.id().unwrap();
        assert_eq!(payload.identity().unwrap(), "j3");

        assert_eq!(store.list(&DatabaseSelector::Index(0), "fq:q1:3"), vec!["j3", "j3"]);
    }

    #[test]
    fn record_fairness_signal_reports_outcome() {
        let store = Arc::new(InMemoryListStore::new());
        let signals = Arc::new(FairnessSignals::new(SignalSettings::new("fq:", 0), store.clone()));
        let fair = json!({"uuid": "j5", "data": {"command": fair_command("q2", 8)}}).to_string();
        let mail = json!({"uuid": "j6", "data": {"command": mail_command()}}).to_string();
        let registry = CommandRegistry::with_defaults();

        let payload = JobPayload::decode(fair, &registry, signals.clone()).unwrap();
        let id = payload.identity().unwrap();
        assert_eq!(
            payload.record_fairness_signal(&id).unwrap(),
            SignalOutcome::Pushed { key: "fq:q2:8".into() }
        );

        let payload = JobPayload::decode(mail, &registry, signals).unwrap();
        let id = payload.identity().unwrap();
        assert_eq!(payload.record_fairness_signal(&id).unwrap(), SignalOutcome::Skipped);
        assert_eq!(store.connection_count(), 1);
    }

    #[test]
    fn id_surfaces_store_outage() {
        let store = Arc::new(InMemoryListStore::new());
        store.set_available(false);
        let signals = Arc::new(FairnessSignals::new(SignalSettings::new("fq:", 0), store));
        let raw = json!({"uuid": "j4", "data": {"command": fair_command("q1", 3)}}).to_string();
        let payload =
            JobPayload::decode(raw, &CommandRegistry::with_defaults(), signals).unwrap();

        assert!(matches!(payload.id(), Err(PayloadError::StoreUnavailable(_))));
        // The pure lookup still resolves.
        assert_eq!(payload.identity().unwrap(), "j4");
    }

    proptest! {
        /// Property: sequential disjoint patches equal one merged patch.
        #[test]
        fn disjoint_patches_merge_associatively(
            left in prop::collection::btree_map("a[a-z]{0,6}", any::<i64>(), 0..5),
            right in prop::collection::btree_map("b[a-z]{0,6}", "[a-z]{0,8}", 0..5),
        ) {
            let base = json!({"uuid": "j1", "data": {"command": mail_command()}});
            let left: Vec<(String, Value)> =
                left.into_iter().map(|(k, v)| (k, json!(v))).collect();
            let right: Vec<(String, Value)> =
                right.into_iter().map(|(k, v)| (k, json!(v))).collect();

            let mut sequential = decode(base.clone());
            sequential.set(left.clone()).unwrap().set(right.clone()).unwrap();

            let mut combined = decode(base);
            combined.set(left.into_iter().chain(right)).unwrap();

            prop_assert_eq!(sequential.decoded(), combined.decoded());
            prop_assert_eq!(sequential.raw(), combined.raw());
        }
    }
}
