//! quill-stream: stream reception layer
//!
//! This crate owns the lifetime of in-flight answer streams, decoupled
//! from whatever UI observes them: a [`StreamManager`] keeps one mutable
//! [`StreamState`] per conversation, drives the wire events from
//! quill-sse into it, decides completion via a redundant signal policy,
//! and broadcasts every state change to subscribers.

pub mod error;
pub mod manager;
pub mod policy;
pub mod state;
pub mod transport;
pub mod update;

pub use error::{Error, Result};
pub use manager::{StreamHandle, StreamManager, StreamOutcome, StreamRequest};
pub use policy::{FinishSignal, StreamConfig};
pub use state::{StreamPhase, StreamState};
pub use transport::{ChatTransport, HttpTransport};
pub use update::{StreamUpdate, StreamUpdates};
