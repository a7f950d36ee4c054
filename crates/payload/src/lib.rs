//! Job-payload envelope.
//!
//! Decodes the raw payload of a queued job, exposes its metadata, lets the
//! producer annotate it before it is pushed, and emits fairness signals for
//! fair-signal jobs when their identity is read.

pub mod codec;
pub mod command;
pub mod in_memory_store;
pub mod payload;
pub mod registry;
pub mod signal;

pub use codec::{Document, PayloadCodec, decode_document, encode_document, lookup};
pub use command::{
    BroadcastEvent, FairSignalJob, GenericJob, JobCommand, JobTarget, JobType, Mailable, ModelRef,
    Notification, QueuedJob, QueuedListener, serialize_command,
};
pub use in_memory_store::InMemoryListStore;
pub use payload::{Dispatchable, JobPayload};
pub use registry::CommandRegistry;
pub use signal::{
    DatabaseSelector, FairnessSignals, ListStore, ListStoreHandle, SignalOutcome, SignalSettings,
    StoreError,
};
