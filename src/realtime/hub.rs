/// Central connection hub - registry and subscription-aware fan-out
///
/// The hub owns the set of connected clients and routes every published
/// event to the clients subscribed to its category. Per-client queues are
/// bounded; a publish never blocks on a slow client. A client whose queue
/// is full at publish time is dropped and unregistered so one stalled
/// consumer cannot hold back the rest.
///
/// The hub is an owned struct with an explicit constructor and shutdown, so
/// independent hubs can coexist in tests.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::errors::GatewayError;
use crate::logger::{self, LogTag};

use super::message::{Envelope, EventCategory};
use super::metrics::HubMetrics;

/// Client ID (unique per connection)
pub type ClientId = u64;

/// Per-client registry entry
struct ClientHandle {
    /// Bounded outbound queue; the client's connection task is the sole consumer
    sender: mpsc::Sender<Envelope>,
    subscriptions: HashSet<EventCategory>,
}

/// Connection hub
pub struct Hub {
    /// Registered clients (client_id -> handle)
    clients: RwLock<HashMap<ClientId, ClientHandle>>,

    /// Next client ID
    next_client_id: AtomicU64,

    /// Per-client outbound queue capacity (from config)
    buffer_size: usize,

    /// Hub metrics
    metrics: Arc<HubMetrics>,
}

impl Hub {
    /// Create a new hub with the given per-client queue capacity
    pub fn new(buffer_size: usize) -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            buffer_size,
            metrics: HubMetrics::new(),
        })
    }

    /// Register a new client with the default subscription set
    pub async fn register(&self) -> (ClientId, mpsc::Receiver<Envelope>) {
        let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.buffer_size);

        let handle = ClientHandle {
            sender: tx,
            subscriptions: EventCategory::DEFAULT.into_iter().collect(),
        };

        let active = {
            let mut clients = self.clients.write().await;
            clients.insert(client_id, handle);
            clients.len()
        };
        self.metrics.connection_opened();

        logger::debug(
            LogTag::Hub,
            &format!("Client {} registered (active={})", client_id, active),
        );

        (client_id, rx)
    }

    /// Remove a client and release its outbound queue
    pub async fn unregister(&self, client_id: ClientId) {
        let removed = self.clients.write().await.remove(&client_id).is_some();
        if removed {
            self.metrics.connection_closed();
            logger::debug(LogTag::Hub, &format!("Client {} unregistered", client_id));
        }
    }

    /// Add categories to a client's subscription set.
    /// Returns false when the client is no longer registered.
    pub async fn subscribe(&self, client_id: ClientId, categories: &[EventCategory]) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get_mut(&client_id) {
            Some(handle) => {
                handle.subscriptions.extend(categories.iter().copied());
                logger::debug(
                    LogTag::Hub,
                    &format!(
                        "Client {} subscriptions now {:?}",
                        client_id, handle.subscriptions
                    ),
                );
                true
            }
            None => false,
        }
    }

    /// Remove categories from a client's subscription set
    pub async fn unsubscribe(&self, client_id: ClientId, categories: &[EventCategory]) -> bool {
        let mut clients = self.clients.write().await;
        match clients.get_mut(&client_id) {
            Some(handle) => {
                for category in categories {
                    handle.subscriptions.remove(category);
                }
                true
            }
            None => false,
        }
    }

    /// Fan an event out to every client subscribed to its category.
    ///
    /// Enqueues onto a snapshot of the subscribed senders so the registry
    /// lock is never held across a send. Clients with a full queue are
    /// dropped. Returns the number of clients the event was delivered to.
    pub async fn publish(&self, category: EventCategory, data: serde_json::Value, stale: bool) -> usize {
        let envelope = if stale {
            Envelope::stale_event(category, data)
        } else {
            Envelope::event(category, data)
        };
        self.metrics.event_published();

        // Snapshot subscribed senders under the read lock
        let targets: Vec<(ClientId, mpsc::Sender<Envelope>)> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .filter(|(_, handle)| handle.subscriptions.contains(&category))
                .map(|(id, handle)| (*id, handle.sender.clone()))
                .collect()
        };

        let mut delivered = 0usize;
        let mut slow: Vec<ClientId> = Vec::new();

        for (client_id, sender) in targets {
            match sender.try_send(envelope.clone()) {
                Ok(_) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => slow.push(client_id),
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Connection task already exited; unregister runs there
                }
            }
        }

        self.metrics.messages_delivered(delivered as u64);

        // Slow consumers are dropped, not caught up: closing the sender ends
        // the connection task, which closes the socket.
        if !slow.is_empty() {
            let mut clients = self.clients.write().await;
            for client_id in slow {
                if clients.remove(&client_id).is_some() {
                    self.metrics.client_dropped_slow();
                    self.metrics.connection_closed();
                    let err = GatewayError::SlowConsumer {
                        client_id,
                        queue_size: self.buffer_size,
                    };
                    logger::warning(LogTag::Hub, &err.to_string());
                }
            }
        }

        delivered
    }

    /// Active client count
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get hub metrics
    pub fn metrics(&self) -> Arc<HubMetrics> {
        self.metrics.clone()
    }

    /// Drop every client, closing their queues. Connection tasks observe the
    /// closed queue and shut their sockets down.
    pub async fn shutdown(&self) {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        for _ in clients.drain() {
            self.metrics.connection_closed();
        }
        logger::info(
            LogTag::Hub,
            &format!("Hub shut down, released {} clients", count),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_unregister() {
        let hub = Hub::new(8);

        let (id1, _rx1) = hub.register().await;
        let (id2, _rx2) = hub.register().await;
        assert_ne!(id1, id2);
        assert_eq!(hub.client_count().await, 2);

        hub.unregister(id1).await;
        assert_eq!(hub.client_count().await, 1);

        // Double unregister is harmless
        hub.unregister(id1).await;
        assert_eq!(hub.metrics().snapshot().connections_closed, 1);
    }

    #[tokio::test]
    async fn test_publish_respects_subscriptions() {
        let hub = Hub::new(8);

        // A keeps the default system-status subscription; B switches to
        // job-progress only.
        let (_id_a, mut rx_a) = hub.register().await;
        let (id_b, mut rx_b) = hub.register().await;
        assert!(hub.subscribe(id_b, &[EventCategory::JobProgress]).await);
        assert!(hub.unsubscribe(id_b, &[EventCategory::SystemStatus]).await);

        let delivered = hub
            .publish(EventCategory::JobProgress, json!({"job_id": "j-1"}), false)
            .await;
        assert_eq!(delivered, 1);

        let envelope = rx_b.try_recv().unwrap();
        assert_eq!(envelope.kind, "job-progress");
        assert!(rx_a.try_recv().is_err());

        let delivered = hub
            .publish(EventCategory::SystemStatus, json!({"cpu": 10}), false)
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(rx_a.try_recv().unwrap().kind, "system-status");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_unknown_client() {
        let hub = Hub::new(8);
        assert!(!hub.subscribe(999, &[EventCategory::JobProgress]).await);
        assert!(!hub.unsubscribe(999, &[EventCategory::JobProgress]).await);
    }

    #[tokio::test]
    async fn test_slow_consumer_is_dropped() {
        let hub = Hub::new(2);
        let (_id, mut rx) = hub.register().await;

        // Fill the queue without draining
        assert_eq!(hub.publish(EventCategory::SystemStatus, json!(1), false).await, 1);
        assert_eq!(hub.publish(EventCategory::SystemStatus, json!(2), false).await, 1);

        // Queue full: the client is dropped, nothing delivered
        assert_eq!(hub.publish(EventCategory::SystemStatus, json!(3), false).await, 0);
        assert_eq!(hub.client_count().await, 0);
        assert_eq!(hub.metrics().snapshot().clients_dropped_slow, 1);

        // The two buffered messages drain, then the queue reports closed
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());

        // Dropped client receives no further messages
        hub.publish(EventCategory::SystemStatus, json!(4), false).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_publish_sets_marker() {
        let hub = Hub::new(4);
        let (_id, mut rx) = hub.register().await;

        hub.publish(EventCategory::SystemStatus, json!({"cpu": 1}), true)
            .await;
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.stale, Some(true));
    }

    #[tokio::test]
    async fn test_shutdown_closes_queues() {
        let hub = Hub::new(4);
        let (_id, mut rx) = hub.register().await;

        hub.shutdown().await;
        assert_eq!(hub.client_count().await, 0);
        assert!(rx.recv().await.is_none());
    }
}
