//! Experience from gateway activity: messages and voice presence.
//!
//! These work items come from the gateway rather than from a command, so
//! they carry no responder. Both lock the member they credit.

use std::sync::Arc;

use async_trait::async_trait;
use warden_core::{ChannelId, Identity, LockScope, ServiceResult, WorkItem};

use crate::dispatch::{Routable, Router};

/// A member posted a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub author: Identity,
    pub channel: ChannelId,
    pub word_count: u32,
    pub is_bot: bool,
}

impl WorkItem for MessageEvent {
    fn kind(&self) -> &'static str {
        "message"
    }

    fn actor(&self) -> Option<Identity> {
        Some(self.author)
    }
}

impl Routable for MessageEvent {
    fn lock_scope(&self) -> LockScope {
        LockScope::Write(self.author.into())
    }
}

/// A member's voice presence changed.
///
/// `before`/`after` hold the voice channel, `None` meaning disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceStateEvent {
    pub member: Identity,
    pub before: Option<ChannelId>,
    pub after: Option<ChannelId>,
    pub self_muted: bool,
}

impl VoiceStateEvent {
    /// Whether the member just connected to voice.
    pub fn joined(&self) -> bool {
        self.before.is_none() && self.after.is_some()
    }

    /// Whether the member just disconnected from voice.
    pub fn left(&self) -> bool {
        self.before.is_some() && self.after.is_none()
    }
}

impl WorkItem for VoiceStateEvent {
    fn kind(&self) -> &'static str {
        "voice_state"
    }

    fn actor(&self) -> Option<Identity> {
        Some(self.member)
    }
}

impl Routable for VoiceStateEvent {
    fn lock_scope(&self) -> LockScope {
        LockScope::Write(self.member.into())
    }
}

/// Experience bookkeeping.
#[async_trait]
pub trait XpService: Send + Sync + 'static {
    /// Credits a message. Bot authors are passed through; the service decides.
    async fn on_message(&self, event: MessageEvent) -> ServiceResult<()>;

    /// Starts or stops voice time tracking.
    async fn on_voice_state(&self, event: VoiceStateEvent) -> ServiceResult<()>;
}

/// Routes [`MessageEvent`]s to an [`XpService`].
#[derive(Clone)]
pub struct MessageRouter {
    service: Arc<dyn XpService>,
}

impl MessageRouter {
    pub fn new(service: Arc<dyn XpService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Router<MessageEvent> for MessageRouter {
    async fn route(&self, event: MessageEvent) -> ServiceResult<()> {
        self.service.on_message(event).await
    }
}

/// Routes [`VoiceStateEvent`]s to an [`XpService`].
#[derive(Clone)]
pub struct VoiceStateRouter {
    service: Arc<dyn XpService>,
}

impl VoiceStateRouter {
    pub fn new(service: Arc<dyn XpService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Router<VoiceStateEvent> for VoiceStateRouter {
    async fn route(&self, event: VoiceStateEvent) -> ServiceResult<()> {
        self.service.on_voice_state(event).await
    }
}
