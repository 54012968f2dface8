//! Bounded single-consumer work channels.
//!
//! A [`WorkChannel`] serializes all work for one entity category. Any number
//! of producers may [`write`](WorkChannel::write) concurrently; exactly one
//! background consumer, spawned by [`start`](WorkChannel::start), hands each
//! message to the channel's [`MessageHandler`] in enqueue order.
//!
//! ```text
//! producers ──write──▶ ┌─────────────────────┐        ┌────────────────┐
//! producers ──write──▶ │ bounded FIFO (10k)  │──recv─▶│ MessageHandler │
//! producers ──write──▶ └─────────────────────┘        └────────────────┘
//!                       full: writers suspend          one at a time
//! ```
//!
//! # Failure handling
//!
//! A handler error or panic is reported to the channel's [`ErrorSink`] with
//! the message's kind and actor attached; the consumer then moves on to the
//! next message. Nothing is retried.
//!
//! # Known limitation
//!
//! There is no per-message timeout: a handler that never completes stalls
//! every later message on the same channel.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::foundation::error::{ChannelError, ChannelResult, DispatchError};
use crate::foundation::id::Identity;
use crate::foundation::responder::Responder;
use crate::framework::sink::{BoxedErrorSink, FailureReport};

/// Default queue capacity for every channel.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// A message that can travel through a [`WorkChannel`].
///
/// The accessors are read before the message is handed to the handler so
/// that failures can be reported with their correlating identifiers.
pub trait WorkItem: Send + 'static {
    /// Short name of the requested operation, e.g. `"treat"`.
    fn kind(&self) -> &'static str;

    /// Who initiated the work.
    fn actor(&self) -> Option<Identity> {
        None
    }

    /// How to answer the initiator, if anyone is waiting for an answer.
    fn responder(&self) -> Option<Arc<dyn Responder>> {
        None
    }
}

/// Per-message processing hook of a channel.
#[async_trait]
pub trait MessageHandler<T>: Send + Sync + 'static {
    /// Processes one message.
    ///
    /// Expected domain problems should be answered through the message's
    /// responder and return `Ok`. An `Err` (or a panic) is treated as a bug
    /// and reported to the error sink. `token` is the consumer's token and
    /// should be passed to any wait the handler performs.
    async fn handle(&self, message: T, token: &CancellationToken) -> Result<(), DispatchError>;
}

/// A shared, type-erased handler.
pub type BoxedMessageHandler<T> = Arc<dyn MessageHandler<T>>;

/// A bounded multi-producer, single-consumer work queue.
pub struct WorkChannel<T: WorkItem> {
    label: String,
    capacity: usize,
    /// `None` once the channel is closed.
    sender: RwLock<Option<mpsc::Sender<T>>>,
    /// Taken by the consumer on start.
    receiver: Mutex<Option<mpsc::Receiver<T>>>,
    /// Accepted messages the consumer has not taken yet.
    pending: Arc<AtomicUsize>,
    started: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
    /// Fires once the consumer task has finished.
    stopped: CancellationToken,
    handler: BoxedMessageHandler<T>,
    sink: BoxedErrorSink,
}

impl<T: WorkItem> WorkChannel<T> {
    /// Creates a channel holding at most `capacity` pending messages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(
        label: impl Into<String>,
        capacity: usize,
        handler: BoxedMessageHandler<T>,
        sink: BoxedErrorSink,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            label: label.into(),
            capacity,
            sender: RwLock::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            pending: Arc::new(AtomicUsize::new(0)),
            started: AtomicBool::new(false),
            consumer: Mutex::new(None),
            stopped: CancellationToken::new(),
            handler,
            sink,
        }
    }

    /// Creates a channel with [`DEFAULT_CAPACITY`].
    pub fn with_default_capacity(
        label: impl Into<String>,
        handler: BoxedMessageHandler<T>,
        sink: BoxedErrorSink,
    ) -> Self {
        Self::new(label, DEFAULT_CAPACITY, handler, sink)
    }

    /// Returns the diagnostic label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the maximum number of pending messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of accepted messages the consumer has not taken.
    ///
    /// Closing the channel does not change this count. Messages left behind
    /// by a cancelled consumer stay counted.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once a consumer has been spawned.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Enqueues `message`, suspending while the queue is full.
    ///
    /// Returns once the message holds a slot. If the channel is closed, or
    /// `token` fires while waiting for a slot, the message is dropped, a
    /// warning is logged and the error is returned. Callers are free to
    /// ignore it: neither case is fatal.
    pub async fn write(&self, message: T, token: &CancellationToken) -> ChannelResult<()> {
        let sender = self.sender.read().clone();
        let Some(sender) = sender else {
            warn!(channel = %self.label, kind = message.kind(), "Write to closed channel dropped");
            return Err(self.closed());
        };

        let permit = tokio::select! {
            biased;
            permit = sender.reserve() => permit,
            () = token.cancelled() => {
                warn!(channel = %self.label, kind = message.kind(), "Write cancelled while channel was full");
                return Err(ChannelError::Cancelled { label: self.label.clone() });
            }
        };

        match permit {
            Ok(permit) => {
                trace!(channel = %self.label, kind = message.kind(), "Message enqueued");
                self.pending.fetch_add(1, Ordering::AcqRel);
                permit.send(message);
                Ok(())
            }
            Err(_) => {
                warn!(channel = %self.label, kind = message.kind(), "Channel closed while waiting, write dropped");
                Err(self.closed())
            }
        }
    }

    /// Enqueues `message` only if a slot is free right now.
    pub fn try_write(&self, message: T) -> ChannelResult<()> {
        let Some(sender) = self.sender.read().clone() else {
            warn!(channel = %self.label, kind = message.kind(), "Write to closed channel dropped");
            return Err(self.closed());
        };

        self.pending.fetch_add(1, Ordering::AcqRel);
        let sent = sender.try_send(message);
        if sent.is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        match sent {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                warn!(channel = %self.label, kind = message.kind(), "Channel full, write dropped");
                Err(ChannelError::Full {
                    label: self.label.clone(),
                })
            }
            Err(TrySendError::Closed(message)) => {
                warn!(channel = %self.label, kind = message.kind(), "Write to closed channel dropped");
                Err(self.closed())
            }
        }
    }

    /// Spawns the consumer loop.
    ///
    /// Only the first call has any effect and returns `true`; later calls
    /// return `false`. The loop exits when `token` fires or when the channel
    /// has been closed and drained.
    pub fn start(&self, token: CancellationToken) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(channel = %self.label, "Consumer already started");
            return false;
        }

        let Some(receiver) = self.receiver.lock().take() else {
            error!(channel = %self.label, "Receiver missing, consumer not started");
            self.stopped.cancel();
            return false;
        };

        let consumer = Consumer {
            label: self.label.clone(),
            receiver,
            pending: Arc::clone(&self.pending),
            handler: Arc::clone(&self.handler),
            sink: Arc::clone(&self.sink),
            token,
        };
        let stopped = self.stopped.clone();
        *self.consumer.lock() = Some(tokio::spawn(async move {
            let _stopped = stopped.drop_guard();
            consumer.run().await;
        }));

        info!(channel = %self.label, capacity = self.capacity, "Channel consumer started");
        true
    }

    /// Stops accepting new writes.
    ///
    /// Already queued messages are still handled; the consumer exits once
    /// the queue is empty. Writers that were already waiting for a slot may
    /// still complete.
    pub fn close(&self) {
        if self.sender.write().take().is_some() {
            info!(channel = %self.label, "Channel closed");
        }
    }

    /// Waits for the consumer loop to exit.
    ///
    /// Returns immediately if the consumer was never started. Safe to call
    /// again after an earlier `join` was dropped before completing.
    pub async fn join(&self) {
        if !self.is_started() {
            return;
        }
        self.stopped.cancelled().await;

        let handle = self.consumer.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(channel = %self.label, error = %e, "Consumer task failed");
        }
    }

    fn closed(&self) -> ChannelError {
        ChannelError::Closed {
            label: self.label.clone(),
        }
    }
}

impl<T: WorkItem> fmt::Debug for WorkChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkChannel")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("started", &self.is_started())
            .field("closed", &self.is_closed())
            .field("pending", &self.len())
            .finish()
    }
}

// ─── Consumer ────────────────────────────────────────────────────────────────

/// The single reader of a channel, owned by its spawned task.
struct Consumer<T: WorkItem> {
    label: String,
    receiver: mpsc::Receiver<T>,
    pending: Arc<AtomicUsize>,
    handler: BoxedMessageHandler<T>,
    sink: BoxedErrorSink,
    token: CancellationToken,
}

impl<T: WorkItem> Consumer<T> {
    async fn run(mut self) {
        loop {
            let message = tokio::select! {
                biased;
                () = self.token.cancelled() => {
                    warn!(
                        channel = %self.label,
                        abandoned = self.receiver.len(),
                        "Consumer cancelled, exiting"
                    );
                    break;
                }
                message = self.receiver.recv() => match message {
                    Some(message) => {
                        self.pending.fetch_sub(1, Ordering::AcqRel);
                        message
                    }
                    None => {
                        info!(channel = %self.label, "Channel closed and drained, consumer exiting");
                        break;
                    }
                },
            };

            self.process(message).await;
        }
    }

    async fn process(&self, message: T) {
        let kind = message.kind();
        let actor = message.actor();
        let responder = message.responder();

        let span = info_span!("dispatch", channel = %self.label, kind, actor = ?actor);
        let outcome = AssertUnwindSafe(self.handler.handle(message, &self.token))
            .catch_unwind()
            .instrument(span)
            .await;

        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(panic) => DispatchError::Panicked(panic_message(panic.as_ref())),
        };

        self.sink.report(FailureReport {
            channel: self.label.clone(),
            kind,
            actor,
            error,
            responder,
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::error::ServiceError;
    use crate::framework::sink::ErrorSink;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio_test::assert_pending;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Job(u64);

    impl WorkItem for Job {
        fn kind(&self) -> &'static str {
            "job"
        }

        fn actor(&self) -> Option<Identity> {
            Some(Identity::new(1, self.0))
        }
    }

    /// Records handled jobs; fails on ids in `fail`, panics on ids in `panic`.
    #[derive(Default)]
    struct Recorder {
        handled: Mutex<Vec<u64>>,
        fail: HashSet<u64>,
        panic: HashSet<u64>,
        in_flight: AtomicUsize,
        handled_notify: Notify,
    }

    #[async_trait]
    impl MessageHandler<Job> for Recorder {
        async fn handle(
            &self,
            message: Job,
            _token: &CancellationToken,
        ) -> Result<(), DispatchError> {
            assert_eq!(self.in_flight.fetch_add(1, Ordering::SeqCst), 0);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.handled.lock().push(message.0);
            self.handled_notify.notify_one();

            if self.panic.contains(&message.0) {
                panic!("job {} exploded", message.0);
            }
            if self.fail.contains(&message.0) {
                return Err(ServiceError::failed(format!("job {} failed", message.0)).into());
            }
            Ok(())
        }
    }

    impl Recorder {
        async fn wait_for(&self, count: usize) -> Vec<u64> {
            loop {
                let notified = self.handled_notify.notified();
                {
                    let handled = self.handled.lock();
                    if handled.len() >= count {
                        return handled.clone();
                    }
                }
                tokio::time::timeout(Duration::from_secs(5), notified)
                    .await
                    .expect("handler was not invoked in time");
            }
        }
    }

    #[derive(Default)]
    struct Reports(Mutex<Vec<FailureReport>>);

    impl ErrorSink for Reports {
        fn report(&self, report: FailureReport) {
            self.0.lock().push(report);
        }
    }

    fn channel(
        capacity: usize,
        recorder: &Arc<Recorder>,
        reports: &Arc<Reports>,
    ) -> WorkChannel<Job> {
        WorkChannel::new(
            "test",
            capacity,
            Arc::clone(recorder) as BoxedMessageHandler<Job>,
            Arc::clone(reports) as BoxedErrorSink,
        )
    }

    #[tokio::test]
    async fn test_fifo_single_producer() {
        let recorder = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let channel = channel(16, &recorder, &reports);
        let token = CancellationToken::new();

        assert!(channel.start(token.clone()));
        for i in 0..100 {
            channel.write(Job(i), &token).await.unwrap();
        }

        let handled = recorder.wait_for(100).await;
        assert_eq!(handled, (0..100).collect::<Vec<_>>());
        assert!(reports.0.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fifo_with_concurrent_producers() {
        let recorder = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let channel = Arc::new(channel(8, &recorder, &reports));
        let token = CancellationToken::new();

        channel.start(token.clone());

        let mut producers = Vec::new();
        for p in 0..8u64 {
            let channel = Arc::clone(&channel);
            let token = token.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..50u64 {
                    channel.write(Job(p * 1000 + i), &token).await.unwrap();
                }
            }));
        }
        for result in futures::future::join_all(producers).await {
            result.unwrap();
        }

        // Everything arrives exactly once, and each producer's writes keep
        // their relative order.
        let handled = recorder.wait_for(400).await;
        assert_eq!(handled.len(), 400);
        assert_eq!(handled.iter().collect::<HashSet<_>>().len(), 400);
        for p in 0..8u64 {
            let own: Vec<u64> = handled
                .iter()
                .copied()
                .filter(|id| id / 1000 == p)
                .collect();
            assert_eq!(own, (0..50).map(|i| p * 1000 + i).collect::<Vec<_>>());
        }
        assert!(reports.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_backpressure_blocks_until_slot_frees() {
        let recorder = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let channel = channel(2, &recorder, &reports);
        let token = CancellationToken::new();

        // Capacity 2, no consumer yet: A and B go straight in.
        channel.write(Job(1), &token).await.unwrap();
        channel.write(Job(2), &token).await.unwrap();
        assert_eq!(channel.len(), 2);

        let mut write_c = tokio_test::task::spawn(channel.write(Job(3), &token));
        assert_pending!(write_c.poll());

        channel.start(token.clone());

        // The consumer frees a slot; C then completes.
        let mut rounds = 0;
        while write_c.poll().is_pending() {
            rounds += 1;
            assert!(rounds < 1000, "write never completed");
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        drop(write_c);

        assert_eq!(recorder.wait_for(3).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_backpressure_cancellation() {
        let recorder = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let channel = channel(1, &recorder, &reports);
        let never = CancellationToken::new();
        let token = CancellationToken::new();

        channel.write(Job(1), &never).await.unwrap();

        let mut blocked = tokio_test::task::spawn(channel.write(Job(2), &token));
        assert_pending!(blocked.poll());

        token.cancel();
        assert!(blocked.is_woken());
        match blocked.poll() {
            std::task::Poll::Ready(Err(ChannelError::Cancelled { label })) => {
                assert_eq!(label, "test")
            }
            other => panic!("unexpected poll result: {other:?}"),
        }
        drop(blocked);

        // The cancelled write took no slot.
        assert_eq!(channel.len(), 1);
        assert!(matches!(
            channel.try_write(Job(3)),
            Err(ChannelError::Full { .. })
        ));

        channel.start(never.clone());
        assert_eq!(recorder.wait_for(1).await, vec![1]);
        channel.write(Job(4), &never).await.unwrap();
        assert_eq!(recorder.wait_for(2).await, vec![1, 4]);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let recorder = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let channel = Arc::new(channel(64, &recorder, &reports));
        let token = CancellationToken::new();

        let mut started = Vec::new();
        for _ in 0..8 {
            let channel = Arc::clone(&channel);
            let token = token.clone();
            started.push(tokio::spawn(async move { channel.start(token) }));
        }
        let results: Vec<bool> = futures::future::join_all(started)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(results.iter().filter(|s| **s).count(), 1);

        for i in 0..50 {
            channel.write(Job(i), &token).await.unwrap();
        }

        // Each job is handled exactly once; `Recorder` asserts no overlap.
        let handled = recorder.wait_for(50).await;
        assert_eq!(handled, (0..50).collect::<Vec<_>>());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(recorder.handled.lock().len(), 50);
        assert!(reports.0.lock().is_empty());
    }

    #[tokio::test]
    async fn test_errors_and_panics_do_not_stop_consumer() {
        let recorder = Arc::new(Recorder {
            fail: HashSet::from([2]),
            panic: HashSet::from([4]),
            ..Default::default()
        });
        let reports = Arc::new(Reports::default());
        let channel = channel(16, &recorder, &reports);
        let token = CancellationToken::new();

        channel.start(token.clone());
        for i in 1..=6 {
            channel.write(Job(i), &token).await.unwrap();
        }

        assert_eq!(recorder.wait_for(6).await, vec![1, 2, 3, 4, 5, 6]);

        let reports = reports.0.lock();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].channel, "test");
        assert_eq!(reports[0].kind, "job");
        assert_eq!(reports[0].actor, Some(Identity::new(1, 2)));
        assert!(matches!(reports[0].error, DispatchError::Service(_)));
        assert!(matches!(
            &reports[1].error,
            DispatchError::Panicked(msg) if msg == "job 4 exploded"
        ));
    }

    #[tokio::test]
    async fn test_close_drains_then_exits() {
        let recorder = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let channel = channel(16, &recorder, &reports);
        let token = CancellationToken::new();

        for i in 0..5 {
            channel.write(Job(i), &token).await.unwrap();
        }
        channel.close();
        assert!(channel.is_closed());
        assert!(matches!(
            channel.write(Job(99), &token).await,
            Err(ChannelError::Closed { .. })
        ));

        channel.start(token.clone());
        tokio::time::timeout(Duration::from_secs(5), channel.join())
            .await
            .expect("consumer must exit after draining");
        assert_eq!(recorder.handled.lock().clone(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_len_survives_close() {
        let recorder = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let channel = channel(16, &recorder, &reports);
        let token = CancellationToken::new();

        for i in 0..5 {
            channel.write(Job(i), &token).await.unwrap();
        }
        assert!(matches!(channel.try_write(Job(5)), Ok(())));
        assert_eq!(channel.len(), 6);

        channel.close();
        assert!(channel.try_write(Job(6)).is_err());
        assert_eq!(channel.len(), 6);

        channel.start(token.clone());
        tokio::time::timeout(Duration::from_secs(5), channel.join())
            .await
            .expect("consumer must exit after draining");
        assert_eq!(channel.len(), 0);
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_consumer() {
        let recorder = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let channel = channel(16, &recorder, &reports);
        let token = CancellationToken::new();

        channel.start(token.clone());
        channel.write(Job(1), &token).await.unwrap();
        recorder.wait_for(1).await;

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), channel.join())
            .await
            .expect("consumer must exit on cancellation");

        // The exited consumer dropped the receiving end.
        let fresh = CancellationToken::new();
        assert!(matches!(
            channel.write(Job(2), &fresh).await,
            Err(ChannelError::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn test_join_survives_abandoned_wait() {
        let recorder = Arc::new(Recorder::default());
        let reports = Arc::new(Reports::default());
        let channel = channel(16, &recorder, &reports);
        let token = CancellationToken::new();

        // Never started: nothing to wait for.
        channel.join().await;

        channel.start(token.clone());
        channel.write(Job(1), &token).await.unwrap();
        recorder.wait_for(1).await;

        // Still running, so a bounded join gives up.
        assert!(
            tokio::time::timeout(Duration::from_millis(10), channel.join())
                .await
                .is_err()
        );

        channel.close();
        tokio::time::timeout(Duration::from_secs(5), channel.join())
            .await
            .expect("consumer must exit after close");
        assert!(channel.is_started());
    }
}
