//! `fairq-core` — shared vocabulary for the job-payload envelope.
//!
//! This crate contains no IO: identifiers and the error model used by the
//! payload codec and the store adapters.

pub mod error;
pub mod id;

pub use error::{PayloadError, PayloadResult};
pub use id::JobId;
