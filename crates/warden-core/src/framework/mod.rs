//! Framework layer - Serialized processing primitives.
//!
//! This module contains the pieces every dispatcher is built from:
//! - Bounded single-consumer work channels
//! - Composite-key asynchronous reader/writer locks
//! - Error sinks for failures observed by detached consumer loops

pub mod channel;
pub mod lock;
pub mod sink;

pub use channel::{BoxedMessageHandler, DEFAULT_CAPACITY, MessageHandler, WorkChannel, WorkItem};
pub use lock::{KeyedGuard, KeyedLock, LockKey, LockScope};
pub use sink::{
    BoxedErrorSink, ErrorSink, FALLBACK_REPLY, FailureReport, ReplyingErrorSink, TracingErrorSink,
};
