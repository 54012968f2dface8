//! Foundation layer - Core abstractions and type system.
//!
//! This module contains the fundamental building blocks shared by every
//! Warden layer:
//! - Identity newtypes for guilds, users and the entities they own
//! - The responder capability used to deliver replies to any surface
//! - Error types for channels, locks and dispatch

pub mod error;
pub mod id;
pub mod responder;

pub use error::{
    ChannelError, ChannelResult, DispatchError, LockError, LockResult, RespondError,
    RespondResult, ServiceError, ServiceResult,
};
pub use id::{ChannelId, GuildId, Identity, PetId, RoleId, UserId};
pub use responder::{
    InteractionResponder, OutboundReply, Reply, ReplyTarget, Responder, Severity,
    TextCommandResponder, reply_channel,
};
