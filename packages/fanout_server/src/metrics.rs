//! Server metrics for observability
//!
//! Transport-level counters live here; fan-out counters come from the hub
//! itself and are folded into the same snapshot.

use fanout_hub::HubStats;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,
    /// Upgrades that could not be registered with the hub
    pub registration_failures: AtomicU64,

    // Frame metrics
    /// Frames accepted from clients and forwarded to the hub
    pub frames_received: AtomicU64,
    /// Frames refused as malformed drawing events
    pub frames_rejected: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn registration_failed(&self) {
        self.registration_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot, attaching hub counters when the hub answered
    pub fn snapshot(&self, hub: Option<HubStats>) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
                registration_failures: self.registration_failures.load(Ordering::Relaxed),
            },
            frames: FrameMetrics {
                received: self.frames_received.load(Ordering::Relaxed),
                rejected: self.frames_rejected.load(Ordering::Relaxed),
            },
            hub: hub.map(HubMetrics::from),
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub frames: FrameMetrics,
    /// Absent once the hub has shut down
    pub hub: Option<HubMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub registration_failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub received: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubMetrics {
    pub members: u64,
    pub registered: u64,
    pub rejected: u64,
    pub unregistered: u64,
    pub dropped: u64,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub send_failures: u64,
    pub send_timeouts: u64,
}

impl From<HubStats> for HubMetrics {
    fn from(stats: HubStats) -> Self {
        Self {
            members: stats.members as u64,
            registered: stats.registered,
            rejected: stats.rejected,
            unregistered: stats.unregistered,
            dropped: stats.dropped,
            broadcasts: stats.broadcasts,
            deliveries: stats.deliveries,
            send_failures: stats.send_failures,
            send_timeouts: stats.send_timeouts,
        }
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    /// Open WebSocket connections as seen by the transport
    pub connections: u64,
    /// Connections currently registered with the hub
    pub members: u64,
    pub uptime_secs: u64,
}
