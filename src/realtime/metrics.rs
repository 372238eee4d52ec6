/// Hub-level metrics
///
/// Aggregate counters across all connections, exposed on the observability
/// endpoint.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Connections accepted over the process lifetime
    connections_opened: AtomicU64,

    /// Connections closed (any reason)
    connections_closed: AtomicU64,

    /// Publish operations issued by the polling bridge
    events_published: AtomicU64,

    /// Per-client deliveries (one publish fans out to many)
    messages_delivered: AtomicU64,

    /// Clients dropped because their outbound queue was full
    clients_dropped_slow: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_delivered(&self, count: u64) {
        self.messages_delivered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn client_dropped_slow(&self) {
        self.clients_dropped_slow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HubMetricsSnapshot {
        HubMetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            clients_dropped_slow: self.clients_dropped_slow.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot (serializable)
#[derive(Debug, Clone, Serialize)]
pub struct HubMetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub events_published: u64,
    pub messages_delivered: u64,
    pub clients_dropped_slow: u64,
}
