//! The hub actor.
//!
//! One worker task owns the membership set and drains four queues: register,
//! unregister, broadcast and a control queue for stats and shutdown. Requests
//! are applied strictly one at a time, so the membership set needs no lock.
//!
//! Queues are polled with a fixed priority (register, unregister, broadcast,
//! control). Ordering within a queue is FIFO. A broadcast runs its whole
//! fan-out before the next request is taken, which means a stalled peer holds
//! up everyone for at most `send_timeout` per send.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::{ConnId, Member, Payload, PeerSender};
use crate::error::{ConnectionError, HubError};
use crate::membership::Membership;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime options for a hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Skip the originating connection when fanning out its own message
    pub exclude_sender: bool,
    /// Upper bound on a single per-peer send or close (None = unbounded)
    pub send_timeout: Option<Duration>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            exclude_sender: false,
            send_timeout: Some(DEFAULT_SEND_TIMEOUT),
        }
    }
}

/// Point-in-time view of the hub's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Connections currently in the membership set
    pub members: usize,
    pub registered: u64,
    /// Registrations refused because the id was already present
    pub rejected: u64,
    pub unregistered: u64,
    /// Members removed because a send failed or timed out
    pub dropped: u64,
    pub broadcasts: u64,
    /// Successful per-peer sends
    pub deliveries: u64,
    pub send_failures: u64,
    pub send_timeouts: u64,
}

struct Register<S> {
    member: Member<S>,
    respond_to: oneshot::Sender<Result<(), HubError>>,
}

struct Broadcast {
    from: Option<ConnId>,
    payload: Payload,
}

enum Control {
    Stats {
        respond_to: oneshot::Sender<HubStats>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to a running hub. Cheap to clone; every reader holds one.
pub struct HubHandle<S> {
    register_tx: mpsc::UnboundedSender<Register<S>>,
    unregister_tx: mpsc::UnboundedSender<ConnId>,
    broadcast_tx: mpsc::UnboundedSender<Broadcast>,
    control_tx: mpsc::UnboundedSender<Control>,
    send_timeout: Option<Duration>,
}

impl<S> Clone for HubHandle<S> {
    fn clone(&self) -> Self {
        Self {
            register_tx: self.register_tx.clone(),
            unregister_tx: self.unregister_tx.clone(),
            broadcast_tx: self.broadcast_tx.clone(),
            control_tx: self.control_tx.clone(),
            send_timeout: self.send_timeout,
        }
    }
}

impl<S: PeerSender> HubHandle<S> {
    /// Add a member. Resolves once the hub has applied the registration, so
    /// anything the caller submits afterwards is ordered after it.
    pub async fn register(&self, member: Member<S>) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        if let Err(mpsc::error::SendError(request)) = self.register_tx.send(Register {
            member,
            respond_to: tx,
        }) {
            request.member.close(self.send_timeout).await;
            return Err(HubError::Closed);
        }
        rx.await.map_err(|_| HubError::Closed)?
    }

    /// Remove and close a member. Unknown or already removed ids are ignored.
    pub fn unregister(&self, id: ConnId) -> Result<(), HubError> {
        self.unregister_tx.send(id).map_err(|_| HubError::Closed)
    }

    /// Fan a payload out to every current member.
    pub fn broadcast(&self, payload: Payload) -> Result<(), HubError> {
        self.broadcast_tx
            .send(Broadcast {
                from: None,
                payload,
            })
            .map_err(|_| HubError::Closed)
    }

    /// Fan out a payload that originated from `from`. The origin is skipped
    /// only when the hub runs with `exclude_sender`.
    pub fn broadcast_from(&self, from: ConnId, payload: Payload) -> Result<(), HubError> {
        self.broadcast_tx
            .send(Broadcast {
                from: Some(from),
                payload,
            })
            .map_err(|_| HubError::Closed)
    }

    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Stats { respond_to: tx })
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Stop accepting requests, finish queued work and release every member.
    /// Resolves when all members have been closed.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(Control::Shutdown { respond_to: tx })
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.control_tx.is_closed()
    }
}

/// The hub worker. Created with [`Hub::spawn`], driven through [`HubHandle`].
pub struct Hub<S> {
    config: HubConfig,
    members: Membership<S>,
    stats: HubStats,
    register_rx: mpsc::UnboundedReceiver<Register<S>>,
    unregister_rx: mpsc::UnboundedReceiver<ConnId>,
    broadcast_rx: mpsc::UnboundedReceiver<Broadcast>,
    control_rx: mpsc::UnboundedReceiver<Control>,
}

impl<S: PeerSender> Hub<S> {
    /// Start a hub worker on the current tokio runtime.
    pub fn spawn(config: HubConfig) -> HubHandle<S> {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            control_tx,
            send_timeout: config.send_timeout,
        };

        let hub = Hub {
            config,
            members: Membership::new(),
            stats: HubStats::default(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            control_rx,
        };

        tokio::spawn(async move {
            hub.run().await;
        });

        handle
    }

    async fn run(mut self) {
        info!(
            exclude_sender = self.config.exclude_sender,
            send_timeout = ?self.config.send_timeout,
            "Hub started"
        );

        let mut shutdown_acks = Vec::new();
        loop {
            tokio::select! {
                biased;
                Some(request) = self.register_rx.recv() => self.handle_register(request).await,
                Some(id) = self.unregister_rx.recv() => self.handle_unregister(id).await,
                Some(request) = self.broadcast_rx.recv() => self.handle_broadcast(request).await,
                Some(control) = self.control_rx.recv() => match control {
                    Control::Stats { respond_to } => {
                        let _ = respond_to.send(self.snapshot());
                    }
                    Control::Shutdown { respond_to } => {
                        shutdown_acks.push(respond_to);
                        break;
                    }
                },
                else => break,
            }
        }

        info!("Hub shutting down, draining queued requests");
        self.drain(&mut shutdown_acks).await;
        self.release_all().await;

        for ack in shutdown_acks {
            let _ = ack.send(());
        }
        info!("Hub stopped");
    }

    async fn handle_register(&mut self, request: Register<S>) {
        let Register { member, respond_to } = request;
        let id = member.id();

        if let Err(duplicate) = self.members.insert(member) {
            warn!(conn = %id, "Rejected duplicate registration");
            self.stats.rejected += 1;
            duplicate.close(self.config.send_timeout).await;
            let _ = respond_to.send(Err(HubError::AlreadyRegistered(id)));
            return;
        }

        self.stats.registered += 1;
        info!(conn = %id, members = self.members.len(), "Client registered");

        // Nobody is left to run this connection's reader.
        if respond_to.send(Ok(())).is_err() {
            debug!(conn = %id, "Registrant went away, releasing connection");
            self.handle_unregister(id).await;
        }
    }

    async fn handle_unregister(&mut self, id: ConnId) {
        match self.members.remove(id) {
            Some(member) => {
                self.stats.unregistered += 1;
                member.close(self.config.send_timeout).await;
                info!(conn = %id, members = self.members.len(), "Client unregistered");
            }
            None => {
                debug!(conn = %id, "Unregister for unknown connection ignored");
            }
        }
    }

    async fn handle_broadcast(&mut self, request: Broadcast) {
        let Broadcast { from, payload } = request;
        self.stats.broadcasts += 1;

        let skip = if self.config.exclude_sender { from } else { None };
        let send_timeout = self.config.send_timeout;
        let mut failed = Vec::new();

        for member in self.members.iter_mut() {
            let id = member.id();
            if Some(id) == skip {
                continue;
            }
            match member.send(payload.clone(), send_timeout).await {
                Ok(()) => self.stats.deliveries += 1,
                Err(ConnectionError::TimedOut) => {
                    self.stats.send_timeouts += 1;
                    warn!(conn = %id, "Send timed out, dropping connection");
                    failed.push(id);
                }
                Err(e) => {
                    self.stats.send_failures += 1;
                    warn!(conn = %id, error = %e, "Send failed, dropping connection");
                    failed.push(id);
                }
            }
        }

        // Drop failures only after every other member has been attempted.
        for id in failed {
            if let Some(member) = self.members.remove(id) {
                self.stats.dropped += 1;
                member.close(send_timeout).await;
                info!(conn = %id, members = self.members.len(), "Client dropped");
            }
        }
    }

    /// Refuse new requests, then apply everything already queued.
    async fn drain(&mut self, shutdown_acks: &mut Vec<oneshot::Sender<()>>) {
        self.register_rx.close();
        self.unregister_rx.close();
        self.broadcast_rx.close();
        self.control_rx.close();

        while let Some(request) = self.register_rx.recv().await {
            self.handle_register(request).await;
        }
        while let Some(id) = self.unregister_rx.recv().await {
            self.handle_unregister(id).await;
        }
        while let Some(request) = self.broadcast_rx.recv().await {
            self.handle_broadcast(request).await;
        }
        while let Some(control) = self.control_rx.recv().await {
            match control {
                Control::Stats { respond_to } => {
                    let _ = respond_to.send(self.snapshot());
                }
                Control::Shutdown { respond_to } => shutdown_acks.push(respond_to),
            }
        }
    }

    async fn release_all(&mut self) {
        let members = self.members.drain();
        let count = members.len();
        for member in members {
            member.close(self.config.send_timeout).await;
        }
        self.stats.unregistered += count as u64;
        info!(released = count, "Released remaining connections");
    }

    fn snapshot(&self) -> HubStats {
        HubStats {
            members: self.members.len(),
            ..self.stats.clone()
        }
    }
}
