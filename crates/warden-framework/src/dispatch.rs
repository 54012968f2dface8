//! The generic locking dispatcher.
//!
//! A [`Dispatcher`] owns one [`WorkChannel`] and routes each message to a
//! domain service through a [`Router`]. The dispatcher is the only layer that
//! takes entity locks: before routing, it acquires the scope the message
//! reports through [`Routable::lock_scope`] and holds it until the service
//! call returns. Services never lock on their own.
//!
//! ```text
//! write ──▶ WorkChannel ──▶ LockingHandler ──acquire scope──▶ Router::route ──▶ service
//!                                 └──────────── release ◀────────────┘
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};
use warden_core::{
    BoxedErrorSink, CancellationToken, ChannelResult, DispatchError, KeyedLock, LockError,
    LockScope, MessageHandler, ServiceResult, WorkChannel, WorkItem,
};

/// A message a [`Dispatcher`] knows how to lock for.
pub trait Routable: WorkItem {
    /// The entity lock to hold while this message is handled.
    fn lock_scope(&self) -> LockScope;

    /// When the producer accepted the message, for latency logging.
    fn accepted_at(&self) -> Option<Instant> {
        None
    }
}

/// Maps a message onto exactly one domain service call.
///
/// Implementations are a plain `match` on the message kind; they hold no
/// state beyond the services they call.
#[async_trait]
pub trait Router<M>: Send + Sync + 'static {
    /// Calls the service method responsible for `message`.
    async fn route(&self, message: M) -> ServiceResult<()>;
}

/// Channel handler that locks, then routes.
struct LockingHandler<M, R> {
    locks: Arc<KeyedLock>,
    router: R,
    _message: PhantomData<fn(M)>,
}

#[async_trait]
impl<M, R> MessageHandler<M> for LockingHandler<M, R>
where
    M: Routable,
    R: Router<M>,
{
    async fn handle(&self, message: M, token: &CancellationToken) -> Result<(), DispatchError> {
        let scope = message.lock_scope();
        // A cancelled wait is logged here and never reaches the sink.
        let _guard = match self.locks.acquire(scope, token).await {
            Ok(guard) => guard,
            Err(LockError::Cancelled { .. }) => {
                warn!(
                    scope = %scope,
                    kind = message.kind(),
                    actor = ?message.actor(),
                    "Lock wait cancelled, message dropped"
                );
                return Ok(());
            }
        };

        if let Some(accepted_at) = message.accepted_at() {
            debug!(
                scope = %scope,
                queued_ms = accepted_at.elapsed().as_millis() as u64,
                "Lock acquired, routing"
            );
        }

        self.router.route(message).await?;
        Ok(())
    }
}

/// One bounded channel plus the routing for one entity category.
pub struct Dispatcher<M: WorkItem> {
    channel: WorkChannel<M>,
}

impl<M: Routable> Dispatcher<M> {
    /// Creates a dispatcher whose consumer locks through `locks` and routes
    /// through `router`.
    pub fn new<R: Router<M>>(
        label: impl Into<String>,
        capacity: usize,
        router: R,
        locks: Arc<KeyedLock>,
        sink: BoxedErrorSink,
    ) -> Self {
        let handler = LockingHandler {
            locks,
            router,
            _message: PhantomData,
        };
        Self {
            channel: WorkChannel::new(label, capacity, Arc::new(handler), sink),
        }
    }

    /// Enqueues a message; see [`WorkChannel::write`].
    pub async fn write(&self, message: M, token: &CancellationToken) -> ChannelResult<()> {
        self.channel.write(message, token).await
    }

    /// Enqueues a message without waiting; see [`WorkChannel::try_write`].
    pub fn try_write(&self, message: M) -> ChannelResult<()> {
        self.channel.try_write(message)
    }

    /// Starts the consumer; see [`WorkChannel::start`].
    pub fn start(&self, token: CancellationToken) -> bool {
        self.channel.start(token)
    }

    /// Stops accepting writes; see [`WorkChannel::close`].
    pub fn close(&self) {
        self.channel.close();
    }

    /// Waits for the consumer to exit.
    pub async fn join(&self) {
        self.channel.join().await;
    }

    /// Returns the diagnostic label.
    pub fn label(&self) -> &str {
        self.channel.label()
    }

    /// Returns the underlying channel.
    pub fn channel(&self) -> &WorkChannel<M> {
        &self.channel
    }
}

impl<M: WorkItem> fmt::Debug for Dispatcher<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channel", &self.channel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use parking_lot::Mutex;
    use tokio::sync::Notify;
    use warden_core::{
        ErrorSink, FailureReport, GuildId, Identity, LockKey, ServiceError, UserId,
    };

    struct Ticket {
        id: u64,
        scope: LockScope,
    }

    impl WorkItem for Ticket {
        fn kind(&self) -> &'static str {
            "tickets"
        }

        fn actor(&self) -> Option<Identity> {
            Some(Identity::new(1, self.id))
        }
    }

    impl Routable for Ticket {
        fn lock_scope(&self) -> LockScope {
            self.scope
        }
    }

    /// Routes by checking the lock is really held, then recording the id.
    struct TicketRouter {
        locks: Arc<KeyedLock>,
        seen: Arc<Mutex<Vec<u64>>>,
        notify: Arc<Notify>,
    }

    #[async_trait]
    impl Router<Ticket> for TicketRouter {
        async fn route(&self, message: Ticket) -> ServiceResult<()> {
            if let LockScope::Write(key) = message.scope {
                // Somebody else trying the same key right now must wait.
                let token = CancellationToken::new();
                let contended =
                    tokio::time::timeout(Duration::from_millis(20), self.locks.read(key, &token))
                        .await;
                assert!(contended.is_err(), "scope was not held during routing");
            }
            self.seen.lock().push(message.id);
            self.notify.notify_one();
            if message.id == 13 {
                return Err(ServiceError::failed("unlucky"));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Reports(Mutex<Vec<FailureReport>>);

    impl ErrorSink for Reports {
        fn report(&self, report: FailureReport) {
            self.0.lock().push(report);
        }
    }

    #[tokio::test]
    async fn test_routes_under_lock_and_reports_failures() {
        let locks = Arc::new(KeyedLock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let notify = Arc::new(Notify::new());
        let reports = Arc::new(Reports::default());
        let dispatcher = Dispatcher::new(
            "tickets",
            8,
            TicketRouter {
                locks: Arc::clone(&locks),
                seen: Arc::clone(&seen),
                notify: Arc::clone(&notify),
            },
            Arc::clone(&locks),
            Arc::clone(&reports) as BoxedErrorSink,
        );
        let token = CancellationToken::new();
        dispatcher.start(token.clone());

        let key = LockKey::Member(GuildId(1), UserId(7));
        for id in [1, 13, 2] {
            dispatcher
                .write(Ticket { id, scope: LockScope::Write(key) }, &token)
                .await
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.lock().len() < 3 {
                notify.notified().await;
            }
        })
        .await
        .expect("dispatcher stalled");

        assert_eq!(*seen.lock(), vec![1, 13, 2]);
        let reports = reports.0.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].channel, "tickets");
        assert_eq!(reports[0].actor, Some(Identity::new(1, 13)));
        assert!(matches!(reports[0].error, DispatchError::Service(_)));
    }

    #[tokio::test]
    async fn test_cancelled_lock_wait_is_not_a_failure() {
        let locks = Arc::new(KeyedLock::new());
        let reports = Arc::new(Reports::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(
            "tickets",
            8,
            TicketRouter {
                locks: Arc::clone(&locks),
                seen: Arc::clone(&seen),
                notify: Arc::new(Notify::new()),
            },
            Arc::clone(&locks),
            Arc::clone(&reports) as BoxedErrorSink,
        );
        let outer = CancellationToken::new();
        let token = CancellationToken::new();

        // Hold the guild so the consumer gets stuck waiting for it.
        let held = locks.write_all_users(GuildId(1), &outer).await.unwrap();

        dispatcher.start(token.clone());
        dispatcher
            .write(
                Ticket {
                    id: 1,
                    scope: LockScope::Write(LockKey::Member(GuildId(1), UserId(1))),
                },
                &outer,
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), dispatcher.join())
            .await
            .expect("consumer must exit");

        assert!(reports.0.lock().is_empty());
        assert!(seen.lock().is_empty());
        drop(held);
    }
}
