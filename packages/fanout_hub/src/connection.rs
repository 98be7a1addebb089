//! Connection capability consumed by the hub.
//!
//! A transport hands the hub a [`Connection`] built from two halves: a
//! [`PeerSender`] (owned by the hub once registered) and a [`PeerReceiver`]
//! (owned by the connection's reader task). Both halves share a cancellation
//! token so that closing the send side wakes up a reader blocked in `recv`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ConnectionError;

/// Identity of one peer connection.
///
/// Compared by identity only; no ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One opaque message. Cloning is cheap, so the hub hands every recipient the
/// same buffer; a transport may still copy it into its own frame type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(Arc<str>),
    Binary(Arc<[u8]>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text.into())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.into())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(bytes.into())
    }
}

/// Outbound half of a peer connection.
pub trait PeerSender: Send + 'static {
    /// Deliver one payload to the peer.
    fn send(&mut self, payload: Payload)
    -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// Release the connection. Must be safe to call on an already closed peer.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Inbound half of a peer connection.
pub trait PeerReceiver: Send + 'static {
    /// Wait for the next payload. Any error ends the connection's reader.
    fn recv(&mut self) -> impl Future<Output = Result<Payload, ConnectionError>> + Send;
}

/// A freshly accepted peer, not yet split between hub and reader.
pub struct Connection<S, R> {
    id: ConnId,
    sender: S,
    receiver: R,
    closed: CancellationToken,
}

impl<S: PeerSender, R: PeerReceiver> Connection<S, R> {
    pub fn new(sender: S, receiver: R) -> Self {
        Self::with_id(ConnId::new(), sender, receiver)
    }

    pub(crate) fn with_id(id: ConnId, sender: S, receiver: R) -> Self {
        Self {
            id,
            sender,
            receiver,
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Split into the hub-owned [`Member`] and the reader-owned [`Source`].
    pub fn split(self) -> (Member<S>, Source<R>) {
        let member = Member {
            id: self.id,
            sender: self.sender,
            closed: self.closed.clone(),
        };
        let source = Source {
            id: self.id,
            receiver: self.receiver,
            closed: self.closed,
        };
        (member, source)
    }
}

/// Hub-side half: what the membership set holds.
pub struct Member<S> {
    id: ConnId,
    sender: S,
    closed: CancellationToken,
}

impl<S> Member<S> {
    pub fn id(&self) -> ConnId {
        self.id
    }
}

impl<S: PeerSender> Member<S> {
    pub(crate) async fn send(
        &mut self,
        payload: Payload,
        limit: Option<Duration>,
    ) -> Result<(), ConnectionError> {
        match limit {
            Some(limit) => tokio::time::timeout(limit, self.sender.send(payload))
                .await
                .unwrap_or(Err(ConnectionError::TimedOut)),
            None => self.sender.send(payload).await,
        }
    }

    /// Close the peer. Consumes the member, so a connection is released once.
    pub(crate) async fn close(mut self, limit: Option<Duration>) {
        // Wake the reader first so it stops feeding the hub.
        self.closed.cancel();
        match limit {
            Some(limit) => {
                if tokio::time::timeout(limit, self.sender.close())
                    .await
                    .is_err()
                {
                    tracing::debug!(conn = %self.id, "close timed out, dropping connection");
                }
            }
            None => self.sender.close().await,
        }
    }
}

/// Reader-side half of a connection.
pub struct Source<R> {
    id: ConnId,
    receiver: R,
    closed: CancellationToken,
}

impl<R> Source<R> {
    pub fn id(&self) -> ConnId {
        self.id
    }
}

impl<R: PeerReceiver> Source<R> {
    /// Next inbound payload, or [`ConnectionError::Closed`] once the hub has
    /// released this connection.
    pub async fn recv(&mut self) -> Result<Payload, ConnectionError> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ConnectionError::Closed),
            result = self.receiver.recv() => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::mock_connection;

    #[test]
    fn conn_ids_are_unique() {
        let a = ConnId::new();
        let b = ConnId::new();
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn payload_conversions() {
        let text = Payload::from("hello");
        assert!(matches!(text, Payload::Text(_)));
        assert_eq!(text.as_bytes(), b"hello");
        assert_eq!(Payload::from("hello".to_string()), text);

        let bin = Payload::from(vec![1u8, 2, 3]);
        assert!(matches!(bin, Payload::Binary(_)));
        assert_eq!(bin.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn split_halves_share_identity() {
        let (conn, _remote) = mock_connection();
        let id = conn.id();
        let (member, source) = conn.split();
        assert_eq!(member.id(), id);
        assert_eq!(source.id(), id);
    }

    #[tokio::test]
    async fn closing_member_fails_pending_recv() {
        let (conn, remote) = mock_connection();
        let (member, mut source) = conn.split();

        let reader = tokio::spawn(async move { source.recv().await });
        tokio::task::yield_now().await;

        member.close(None).await;
        assert_eq!(reader.await.unwrap(), Err(ConnectionError::Closed));
        assert_eq!(remote.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_timeout_reports_timed_out() {
        let (conn, remote) = mock_connection();
        let (mut member, _source) = conn.split();
        remote.stall_sends(true);

        let result = member
            .send(Payload::from("slow"), Some(Duration::from_millis(100)))
            .await;
        assert_eq!(result, Err(ConnectionError::TimedOut));
    }
}
