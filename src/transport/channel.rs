//! Client channel base
//!
//! Concrete channel state machines are built on top of `ClientChannel`,
//! which owns the two invariants they must never re-implement: a channel
//! binds at most one transport connection over its lifetime, and any
//! failed send closes the channel exactly once with the failure as the
//! cause.
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch, OnceCell};
use tracing::{debug, warn};

use crate::error::{KestrelError, Result};
use crate::transport::messages::OutboundMessage;

/// A bound, message-oriented connection to the registry.
#[async_trait]
pub trait MessageConnection: Send + Sync {
    /// Post a message and complete once the server acknowledges it.
    async fn submit_with_ack(&self, message: OutboundMessage) -> Result<()>;

    /// Post a bare acknowledgement.
    async fn acknowledge(&self) -> Result<()>;

    /// Post a terminal error frame.
    async fn report_error(&self, error: KestrelError) -> Result<()>;

    /// Release the connection. Must tolerate repeated calls.
    fn shutdown(&self);
}

/// Connection factory for a transport.
#[async_trait]
pub trait TransportClient: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn MessageConnection>>;
}

/// Completion handle for a send; resolves when the transport reports the
/// outcome. Dropping it does not detach the send.
pub type SendCompletion = oneshot::Receiver<Result<()>>;

// Shared between the channel and its in-flight send observers so a
// transport failure can close the channel after the handle is gone.
struct ChannelCore<S> {
    state: watch::Sender<S>,
    closed_state: S,
    // populated by the first successful connect, then shared
    connection: OnceCell<Arc<dyn MessageConnection>>,
    closed: AtomicBool,
}

impl<S> ChannelCore<S>
where
    S: Copy + Send + Sync + std::fmt::Debug + 'static,
{
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let state = *self.state.borrow();
        debug!(?state, "closing client channel");
        if let Some(connection) = self.connection.get() {
            connection.shutdown();
        }
        self.state.send_replace(self.closed_state);
    }
}

pub struct ClientChannel<S> {
    client: Arc<dyn TransportClient>,
    core: Arc<ChannelCore<S>>,
}

impl<S> ClientChannel<S>
where
    S: Copy + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new(initial_state: S, closed_state: S, client: Arc<dyn TransportClient>) -> Self {
        let (state, _) = watch::channel(initial_state);
        Self {
            client,
            core: Arc::new(ChannelCore {
                state,
                closed_state,
                connection: OnceCell::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> S {
        *self.core.state.borrow()
    }

    pub fn move_to(&self, next: S) {
        self.core.state.send_replace(next);
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.core.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }

    /// The one and only connection associated with this channel. Late
    /// observers share the connection bound by the first call; the
    /// transport is asked to connect at most once.
    pub async fn connect(&self) -> Result<Arc<dyn MessageConnection>> {
        self.core
            .connection
            .get_or_try_init(|| async { self.client.connect().await })
            .await
            .cloned()
    }

    pub fn send_expect_ack(
        &self,
        connection: &Arc<dyn MessageConnection>,
        message: OutboundMessage,
    ) -> SendCompletion {
        debug!(kind = message.kind(), "sending message to the server");
        let kind = message.kind();
        let connection = Arc::clone(connection);
        self.observe_send(kind, async move { connection.submit_with_ack(message).await })
    }

    pub fn send_ack(&self, connection: &Arc<dyn MessageConnection>) -> SendCompletion {
        debug!("sending acknowledgment to the server");
        let connection = Arc::clone(connection);
        self.observe_send("acknowledgment", async move { connection.acknowledge().await })
    }

    pub fn send_error(
        &self,
        connection: &Arc<dyn MessageConnection>,
        error: KestrelError,
    ) -> SendCompletion {
        debug!(error = %error, "sending error to the server");
        let connection = Arc::clone(connection);
        self.observe_send("error", async move { connection.report_error(error).await })
    }

    // The send outcome is observed here even when the caller drops the
    // completion, so transport failures always reach `close`.
    fn observe_send<F>(&self, kind: &'static str, send: F) -> SendCompletion
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            let result = send.await;
            if let Err(err) = &result {
                warn!(kind, error = %err, "failed to send to the server, closing the channel");
                core.close();
            }
            let _ = done_tx.send(result);
        });
        done_rx
    }

    /// Idempotent. The first call shuts down the bound connection, if
    /// any, and moves the state machine to the closed state.
    pub fn close(&self) {
        self.core.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum TestState {
        Idle,
        Closed,
    }

    #[derive(Default)]
    struct StubConnection {
        submits: AtomicUsize,
        acks: AtomicUsize,
        errors: AtomicUsize,
        shutdowns: AtomicUsize,
        fail_sends: AtomicBool,
    }

    #[async_trait]
    impl MessageConnection for StubConnection {
        async fn submit_with_ack(&self, _message: OutboundMessage) -> Result<()> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(KestrelError::Transport("broken pipe".to_string()));
            }
            Ok(())
        }

        async fn acknowledge(&self) -> Result<()> {
            self.acks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn report_error(&self, _error: KestrelError) -> Result<()> {
            self.errors.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubTransport {
        connection: Arc<StubConnection>,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl TransportClient for StubTransport {
        async fn connect(&self) -> Result<Arc<dyn MessageConnection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&self.connection) as Arc<dyn MessageConnection>)
        }
    }

    fn new_channel() -> (ClientChannel<TestState>, Arc<StubTransport>) {
        let transport = Arc::new(StubTransport {
            connection: Arc::new(StubConnection::default()),
            connects: AtomicUsize::new(0),
        });
        let channel = ClientChannel::new(
            TestState::Idle,
            TestState::Closed,
            Arc::clone(&transport) as Arc<dyn TransportClient>,
        );
        (channel, transport)
    }

    #[tokio::test]
    async fn connect_is_memoized() {
        let (channel, transport) = new_channel();

        let first = channel.connect().await.unwrap();
        let second = channel.connect().await.unwrap();

        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn failed_send_closes_channel_once() {
        let (channel, transport) = new_channel();
        transport.connection.fail_sends.store(true, Ordering::SeqCst);

        let connection = channel.connect().await.unwrap();
        let completion = channel.send_expect_ack(&connection, OutboundMessage::Heartbeat);

        assert!(completion.await.unwrap().is_err());
        assert!(channel.is_closed());
        assert_eq!(channel.state(), TestState::Closed);
        assert_eq!(transport.connection.shutdowns.load(Ordering::SeqCst), 1);

        // further closes are no-ops
        channel.close();
        assert_eq!(transport.connection.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_is_observed_without_awaiting_completion() {
        let (channel, transport) = new_channel();
        transport.connection.fail_sends.store(true, Ordering::SeqCst);

        let connection = channel.connect().await.unwrap();
        drop(channel.send_expect_ack(&connection, OutboundMessage::Heartbeat));

        // the spawned observer still funnels the failure into close
        for _ in 0..20 {
            if channel.is_closed() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn ack_and_error_frames_reach_the_connection() {
        let (channel, transport) = new_channel();
        let connection = channel.connect().await.unwrap();

        channel.send_ack(&connection).await.unwrap().unwrap();
        channel
            .send_error(
                &connection,
                KestrelError::Registry("lease rejected".to_string()),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(transport.connection.acks.load(Ordering::SeqCst), 1);
        assert_eq!(transport.connection.errors.load(Ordering::SeqCst), 1);
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn close_without_connection_is_metadata_only() {
        let (channel, transport) = new_channel();
        channel.close();

        assert!(channel.is_closed());
        assert_eq!(channel.state(), TestState::Closed);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 0);
        assert_eq!(transport.connection.shutdowns.load(Ordering::SeqCst), 0);
    }
}
