//! Scripted in-memory connection for hub and reader tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::connection::{ConnId, Connection, Payload, PeerReceiver, PeerSender};
use crate::error::ConnectionError;

/// How long tests wait for something that is expected to arrive.
pub(crate) const DELIVERY_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Default)]
struct MockState {
    fail_sends: AtomicBool,
    stall_sends: AtomicBool,
    closes: AtomicUsize,
}

pub(crate) struct MockSender {
    delivered: mpsc::UnboundedSender<Payload>,
    state: Arc<MockState>,
}

impl PeerSender for MockSender {
    async fn send(&mut self, payload: Payload) -> Result<(), ConnectionError> {
        if self.state.stall_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport("mock send failure".into()));
        }
        if self.state.closes.load(Ordering::SeqCst) > 0 {
            return Err(ConnectionError::Closed);
        }
        self.delivered
            .send(payload)
            .map_err(|_| ConnectionError::Closed)
    }

    async fn close(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockReceiver {
    inbound: mpsc::UnboundedReceiver<Result<Payload, ConnectionError>>,
}

impl PeerReceiver for MockReceiver {
    async fn recv(&mut self) -> Result<Payload, ConnectionError> {
        self.inbound
            .recv()
            .await
            .unwrap_or(Err(ConnectionError::Closed))
    }
}

/// The test's end of a mock connection.
pub(crate) struct MockRemote {
    inbound: Option<mpsc::UnboundedSender<Result<Payload, ConnectionError>>>,
    delivered: mpsc::UnboundedReceiver<Payload>,
    state: Arc<MockState>,
}

impl MockRemote {
    /// Queue a payload for the connection's reader.
    pub(crate) fn push(&self, payload: impl Into<Payload>) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Ok(payload.into()));
        }
    }

    /// Make the reader's next receive fail.
    pub(crate) fn fail_recv(&self, err: ConnectionError) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Err(err));
        }
    }

    /// Peer goes away: pending and future receives report `Closed`.
    pub(crate) fn hang_up(&mut self) {
        self.inbound.take();
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn stall_sends(&self, stall: bool) {
        self.state.stall_sends.store(stall, Ordering::SeqCst);
    }

    pub(crate) fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Wait for the next payload the hub delivered to this peer.
    pub(crate) async fn next_delivery(&mut self) -> Option<Payload> {
        tokio::time::timeout(DELIVERY_TIMEOUT, self.delivered.recv())
            .await
            .ok()
            .flatten()
    }

    /// Payload already delivered, without waiting.
    pub(crate) fn try_delivery(&mut self) -> Option<Payload> {
        self.delivered.try_recv().ok()
    }
}

pub(crate) type MockConnection = Connection<MockSender, MockReceiver>;

pub(crate) fn mock_connection() -> (MockConnection, MockRemote) {
    mock_connection_with_id(ConnId::new())
}

pub(crate) fn mock_connection_with_id(id: ConnId) -> (MockConnection, MockRemote) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
    let state = Arc::new(MockState::default());

    let sender = MockSender {
        delivered: delivered_tx,
        state: state.clone(),
    };
    let receiver = MockReceiver {
        inbound: inbound_rx,
    };
    let remote = MockRemote {
        inbound: Some(inbound_tx),
        delivered: delivered_rx,
        state,
    };

    (Connection::with_id(id, sender, receiver), remote)
}
