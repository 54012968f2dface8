//! The responder capability.
//!
//! A [`Responder`] is carried inside every command action so the consumer can
//! answer the requester without knowing which surface the command came from.
//! Two implementations are provided, one per originating surface:
//!
//! - [`TextCommandResponder`]: the command was a prefixed text message; replies
//!   are posted into the same channel, referencing the command message.
//! - [`InteractionResponder`]: the command was a slash command; replies answer
//!   the interaction token.
//!
//! Both push [`OutboundReply`] values into a bounded channel drained by the
//! gateway client (external), mirroring how a bot hands outbound traffic to its
//! transport.
//!
//! ```rust,ignore
//! let (tx, mut rx) = reply_channel(64);
//! let responder = TextCommandResponder::new(tx, ChannelId(10), 99);
//! responder.respond(Reply::info("Done")).await?;
//! let outbound = rx.recv().await.unwrap();
//! ```

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::foundation::error::{RespondError, RespondResult};
use crate::foundation::id::ChannelId;

/// Visual weight of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    /// Normal result.
    #[default]
    Info,
    /// The request was understood but refused (validation, permissions).
    Warning,
    /// Something broke.
    Error,
}

/// Renderer-agnostic reply content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    /// Optional heading.
    pub title: Option<String>,
    /// Main text.
    pub body: String,
    /// How the reply should be presented.
    pub severity: Severity,
}

impl Reply {
    /// Creates an informational reply.
    pub fn info(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Creates a warning reply.
    pub fn warning(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            severity: Severity::Warning,
            ..Default::default()
        }
    }

    /// Creates an error reply.
    pub fn error(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            severity: Severity::Error,
            ..Default::default()
        }
    }

    /// Sets the heading.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// The capability to answer whoever issued a command.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Delivers a single reply.
    async fn respond(&self, reply: Reply) -> RespondResult<()>;

    /// Delivers a multi-page reply.
    async fn respond_paginated(&self, pages: Vec<Reply>) -> RespondResult<()>;
}

impl fmt::Debug for dyn Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Responder")
    }
}

// ─── Outbound transport ──────────────────────────────────────────────────────

/// Where an outbound reply should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    /// Reply to a text message in a channel.
    Message {
        /// Channel the command was posted in.
        channel: ChannelId,
        /// Id of the command message.
        message_id: u64,
    },
    /// Answer a slash-command interaction.
    Interaction {
        /// Interaction token issued by the gateway.
        token: String,
    },
}

/// A reply handed to the gateway client for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    /// Destination.
    pub target: ReplyTarget,
    /// Content, one entry per page.
    pub pages: Vec<Reply>,
    /// Whether the client should render page navigation.
    pub paginated: bool,
}

/// Creates the bounded channel replies flow through.
pub fn reply_channel(
    buffer_size: usize,
) -> (mpsc::Sender<OutboundReply>, mpsc::Receiver<OutboundReply>) {
    mpsc::channel(buffer_size)
}

async fn deliver(tx: &mpsc::Sender<OutboundReply>, reply: OutboundReply) -> RespondResult<()> {
    tx.send(reply)
        .await
        .map_err(|_| RespondError::TransportClosed)
}

// ─── TextCommandResponder ────────────────────────────────────────────────────

/// Responds to a prefixed text command.
///
/// Text channels have no page navigation, so paginated content is posted as
/// one message per page with a `page i/n` footer.
#[derive(Debug, Clone)]
pub struct TextCommandResponder {
    tx: mpsc::Sender<OutboundReply>,
    channel: ChannelId,
    message_id: u64,
}

impl TextCommandResponder {
    /// Creates a responder replying to `message_id` in `channel`.
    pub fn new(tx: mpsc::Sender<OutboundReply>, channel: ChannelId, message_id: u64) -> Self {
        Self {
            tx,
            channel,
            message_id,
        }
    }

    fn target(&self) -> ReplyTarget {
        ReplyTarget::Message {
            channel: self.channel,
            message_id: self.message_id,
        }
    }
}

#[async_trait]
impl Responder for TextCommandResponder {
    async fn respond(&self, reply: Reply) -> RespondResult<()> {
        deliver(
            &self.tx,
            OutboundReply {
                target: self.target(),
                pages: vec![reply],
                paginated: false,
            },
        )
        .await
    }

    async fn respond_paginated(&self, pages: Vec<Reply>) -> RespondResult<()> {
        if pages.is_empty() {
            return Err(RespondError::NoPages);
        }

        let total = pages.len();
        for (index, mut page) in pages.into_iter().enumerate() {
            page.body = format!("{}\n\npage {}/{}", page.body, index + 1, total);
            self.respond(page).await?;
        }
        Ok(())
    }
}

// ─── InteractionResponder ────────────────────────────────────────────────────

/// Responds to a slash-command interaction.
#[derive(Debug, Clone)]
pub struct InteractionResponder {
    tx: mpsc::Sender<OutboundReply>,
    token: String,
}

impl InteractionResponder {
    /// Creates a responder for the given interaction token.
    pub fn new(tx: mpsc::Sender<OutboundReply>, token: impl Into<String>) -> Self {
        Self {
            tx,
            token: token.into(),
        }
    }

    fn target(&self) -> ReplyTarget {
        ReplyTarget::Interaction {
            token: self.token.clone(),
        }
    }
}

#[async_trait]
impl Responder for InteractionResponder {
    async fn respond(&self, reply: Reply) -> RespondResult<()> {
        deliver(
            &self.tx,
            OutboundReply {
                target: self.target(),
                pages: vec![reply],
                paginated: false,
            },
        )
        .await
    }

    async fn respond_paginated(&self, pages: Vec<Reply>) -> RespondResult<()> {
        if pages.is_empty() {
            return Err(RespondError::NoPages);
        }

        deliver(
            &self.tx,
            OutboundReply {
                target: self.target(),
                pages,
                paginated: true,
            },
        )
        .await
    }
}
