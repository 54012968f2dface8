//! Error sinks.
//!
//! Consumer loops run detached from whoever enqueued the work, so a failure
//! cannot be returned to the producer. Instead each failure is packaged into
//! a [`FailureReport`] carrying the correlating identifiers (channel, action
//! kind, actor) and handed to an [`ErrorSink`].

use std::sync::Arc;

use tracing::{error, warn};

use crate::foundation::error::DispatchError;
use crate::foundation::id::Identity;
use crate::foundation::responder::{Reply, Responder};

/// Generic text sent to the requester when their command failed unexpectedly.
pub const FALLBACK_REPLY: &str = "Something went wrong while handling your command.";

/// A failure observed at a channel's handler boundary.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// Label of the channel whose consumer observed the failure.
    pub channel: String,
    /// Kind of the action being handled.
    pub kind: &'static str,
    /// Who initiated the action, if known.
    pub actor: Option<Identity>,
    /// What went wrong.
    pub error: DispatchError,
    /// How to reach the requester, if the action carried a responder.
    pub responder: Option<Arc<dyn Responder>>,
}

/// Receives failures from consumer loops.
///
/// Implementations must not panic; a sink that fails has nowhere to report to.
pub trait ErrorSink: Send + Sync + 'static {
    /// Records a failure.
    fn report(&self, report: FailureReport);
}

/// A shared, type-erased sink.
pub type BoxedErrorSink = Arc<dyn ErrorSink>;

impl<S: ErrorSink + ?Sized> ErrorSink for Arc<S> {
    fn report(&self, report: FailureReport) {
        (**self).report(report);
    }
}

// ─── TracingErrorSink ────────────────────────────────────────────────────────

/// Logs every failure at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, report: FailureReport) {
        match report.actor {
            Some(actor) => error!(
                channel = %report.channel,
                kind = report.kind,
                guild = %actor.guild,
                user = %actor.user,
                error = %report.error,
                "Unhandled failure in channel consumer"
            ),
            None => error!(
                channel = %report.channel,
                kind = report.kind,
                error = %report.error,
                "Unhandled failure in channel consumer"
            ),
        }
    }
}

// ─── ReplyingErrorSink ───────────────────────────────────────────────────────

/// Forwards to an inner sink, then tells the requester something went wrong.
///
/// The reply is sent from a spawned task so `report` never suspends. Delivery
/// is best effort: a failed reply is logged and dropped.
#[derive(Debug, Clone)]
pub struct ReplyingErrorSink<S> {
    inner: S,
    message: String,
}

impl<S: ErrorSink> ReplyingErrorSink<S> {
    /// Wraps `inner` with the default fallback text.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            message: FALLBACK_REPLY.to_string(),
        }
    }

    /// Overrides the fallback text.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl<S: ErrorSink> ErrorSink for ReplyingErrorSink<S> {
    fn report(&self, report: FailureReport) {
        let responder = report.responder.clone();
        let channel = report.channel.clone();
        self.inner.report(report);

        let Some(responder) = responder else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(channel = %channel, "No runtime available for fallback reply");
            return;
        };

        let reply = Reply::error(self.message.clone());
        handle.spawn(async move {
            if let Err(e) = responder.respond(reply).await {
                warn!(channel = %channel, error = %e, "Failed to send fallback reply");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::id::ChannelId;
    use crate::foundation::responder::{Severity, TextCommandResponder, reply_channel};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<FailureReport>>);

    impl ErrorSink for Recording {
        fn report(&self, report: FailureReport) {
            self.0.lock().push(report);
        }
    }

    fn report(responder: Option<Arc<dyn Responder>>) -> FailureReport {
        FailureReport {
            channel: "pets".into(),
            kind: "treat",
            actor: Some(Identity::new(1, 2)),
            error: DispatchError::Panicked("boom".into()),
            responder,
        }
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingErrorSink.report(report(None));
    }

    #[tokio::test]
    async fn test_replying_sink_sends_fallback() {
        let recording = Arc::new(Recording::default());
        let sink = ReplyingErrorSink::new(Arc::clone(&recording));
        let (tx, mut rx) = reply_channel(4);
        let responder: Arc<dyn Responder> =
            Arc::new(TextCommandResponder::new(tx, ChannelId(5), 6));

        sink.report(report(Some(responder)));

        let outbound = rx.recv().await.unwrap();
        assert_eq!(outbound.pages[0].severity, Severity::Error);
        assert_eq!(outbound.pages[0].body, FALLBACK_REPLY);
        assert_eq!(recording.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_replying_sink_without_responder() {
        let recording = Arc::new(Recording::default());
        let sink = ReplyingErrorSink::new(Arc::clone(&recording)).with_message("oops");

        sink.report(report(None));

        let reports = recording.0.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, "treat");
    }
}
