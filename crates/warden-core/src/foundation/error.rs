//! Unified error types for the Warden core.
//!
//! This module provides the error types used across channels, locks and the
//! dispatch boundary. Configuration and runtime errors live in `warden-runtime`.

use thiserror::Error;

use crate::foundation::id::GuildId;

// =============================================================================
// Channel Errors
// =============================================================================

/// Errors returned by [`WorkChannel`](crate::WorkChannel) producers.
///
/// None of these are fatal: the channel logs them at warning level and the
/// message is dropped from the system's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel no longer accepts writes.
    #[error("channel '{label}' is closed")]
    Closed {
        /// Label of the channel.
        label: String,
    },

    /// The wait for a free slot was cancelled.
    #[error("write to channel '{label}' was cancelled")]
    Cancelled {
        /// Label of the channel.
        label: String,
    },

    /// The channel is at capacity (non-waiting writes only).
    #[error("channel '{label}' is full")]
    Full {
        /// Label of the channel.
        label: String,
    },
}

// =============================================================================
// Lock Errors
// =============================================================================

/// Errors returned by [`KeyedLock`](crate::KeyedLock) acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The wait was cancelled before every sub-lock was held.
    #[error("lock acquisition for {scope} in guild {guild} was cancelled")]
    Cancelled {
        /// Guild the lock belongs to.
        guild: GuildId,
        /// Human-readable description of the requested scope.
        scope: String,
    },
}

// =============================================================================
// Responder Errors
// =============================================================================

/// Errors that can occur while delivering a reply.
#[derive(Debug, Clone, Error)]
pub enum RespondError {
    /// The outbound transport is gone.
    #[error("reply transport is closed")]
    TransportClosed,

    /// A paginated reply was requested with no pages.
    #[error("paginated reply has no pages")]
    NoPages,
}

// =============================================================================
// Service Errors
// =============================================================================

/// Unexpected failures raised by domain services.
///
/// Validation problems (bad role name, duplicate entity) are answered through
/// the responder and never become a `ServiceError`.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// A referenced entity was expected to exist in the cache but did not.
    #[error("{entity} not found in cache")]
    Missing {
        /// Description of the missing entity.
        entity: String,
    },

    /// Replying to the requester failed.
    #[error(transparent)]
    Respond(#[from] RespondError),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl ServiceError {
    /// Creates a missing-entity error.
    pub fn missing(entity: impl Into<String>) -> Self {
        Self::Missing {
            entity: entity.into(),
        }
    }

    /// Creates a generic failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Everything that can go wrong while a consumer handles one message.
///
/// These reach the [`ErrorSink`](crate::ErrorSink); the consumer loop keeps
/// running regardless.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The entity lock could not be taken.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The domain service failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Result type for lock acquisition.
pub type LockResult<T> = Result<T, LockError>;

/// Result type for replies.
pub type RespondResult<T> = Result<T, RespondError>;

/// Result type for domain services.
pub type ServiceResult<T> = Result<T, ServiceError>;
