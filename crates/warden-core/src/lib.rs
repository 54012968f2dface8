//! # Warden Core
//!
//! The core engine of the Warden bot.
//!
//! This crate provides the concurrency primitives every Warden dispatcher is
//! built on.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! Core abstractions and type system:
//! - **Identities**: typed snowflakes ([`GuildId`], [`UserId`], [`Identity`])
//! - **Responder**: delivering replies to any originating surface ([`Responder`])
//! - **Errors**: channel, lock, service and dispatch errors
//!
//! ### Framework Layer
//!
//! Serialized processing:
//! - **Work channels**: bounded, single-consumer queues ([`WorkChannel`])
//! - **Keyed locks**: guild/member reader-writer locks ([`KeyedLock`])
//! - **Error sinks**: where detached failures go ([`ErrorSink`])
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────┐  write   ┌─────────────┐  recv   ┌──────────────┐  lock   ┌────────────┐
//! │ producer │────────▶│ WorkChannel │───────▶│ handler      │───────▶│ KeyedLock  │
//! │ producer │────────▶│  (bounded)  │        │ (one at a    │        └────────────┘
//! └──────────┘          └─────────────┘        │  time)       │──err──▶ ErrorSink
//!                                               └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_core::{WorkChannel, WorkItem, MessageHandler, TracingErrorSink};
//!
//! let channel = WorkChannel::with_default_capacity(
//!     "messages",
//!     Arc::new(MyHandler),
//!     Arc::new(TracingErrorSink),
//! );
//! channel.start(token.clone());
//! channel.write(MyItem::new(), &token).await?;
//! ```

// Architectural layers
pub mod foundation;
pub mod framework;

// Re-export foundation types
pub use foundation::{
    ChannelError, ChannelId, ChannelResult, DispatchError, GuildId, Identity,
    InteractionResponder, LockError, LockResult, OutboundReply, PetId, Reply, ReplyTarget,
    RespondError, RespondResult, Responder, RoleId, ServiceError, ServiceResult, Severity,
    TextCommandResponder, UserId, reply_channel,
};

// Re-export framework types
pub use framework::{
    BoxedErrorSink, BoxedMessageHandler, DEFAULT_CAPACITY, ErrorSink, FALLBACK_REPLY,
    FailureReport, KeyedGuard, KeyedLock, LockKey, LockScope, MessageHandler, ReplyingErrorSink,
    TracingErrorSink, WorkChannel, WorkItem,
};

// Re-export the cancellation token every wait accepts
pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::framework::{
        ErrorSink, KeyedLock, LockKey, LockScope, MessageHandler, WorkChannel, WorkItem,
    };
    pub use tokio_util::sync::CancellationToken;
}
