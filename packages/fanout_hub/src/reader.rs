//! Per-connection reader task and the accept step that starts it.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::connection::{Connection, PeerReceiver, PeerSender, Source};
use crate::error::{ConnectionError, HubError};
use crate::hub::HubHandle;

/// Why a reader task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// Receive failed; the connection was handed back to the hub for removal
    Disconnected(ConnectionError),
    /// The hub stopped accepting broadcasts
    HubClosed,
}

/// Register a freshly accepted connection and start its reader.
///
/// Registration completes before the reader's first receive, so every
/// broadcast from this connection is ordered after its own registration.
pub async fn accept<S, R>(
    hub: &HubHandle<S>,
    conn: Connection<S, R>,
) -> Result<JoinHandle<ReaderExit>, HubError>
where
    S: PeerSender,
    R: PeerReceiver,
{
    let (member, source) = conn.split();
    hub.register(member).await?;
    Ok(tokio::spawn(run_reader(hub.clone(), source)))
}

/// Forward everything the connection receives to the hub until the first
/// receive error, then ask the hub to drop the connection.
pub async fn run_reader<S, R>(hub: HubHandle<S>, mut source: Source<R>) -> ReaderExit
where
    S: PeerSender,
    R: PeerReceiver,
{
    let id = source.id();
    debug!(conn = %id, "Reader started");
    let mut forwarded: u64 = 0;

    let exit = loop {
        match source.recv().await {
            Ok(payload) => {
                if hub.broadcast_from(id, payload).is_err() {
                    break ReaderExit::HubClosed;
                }
                forwarded += 1;
            }
            Err(err) => {
                match &err {
                    ConnectionError::Closed => debug!(conn = %id, "Connection closed"),
                    other => info!(conn = %id, error = %other, "Receive failed"),
                }
                let _ = hub.unregister(id);
                break ReaderExit::Disconnected(err);
            }
        }
    };

    debug!(conn = %id, forwarded, "Reader stopped");
    exit
}
