/// Event polling bridge
///
/// Translates the pull-based engine into the push-based client stream. One
/// independent timer task per category, each polling its engine query through
/// the shared circuit breaker and publishing the mapped payload to the hub.
/// A failed cycle never stops subsequent cycles; during outages the last
/// successfully fetched payload is republished with a stale marker so
/// clients can render "data may be outdated" instead of freezing silently.
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::{CircuitBreaker, EngineClient};
use crate::errors::GatewayError;
use crate::logger::{self, LogTag};

use super::hub::Hub;
use super::message::EventCategory;

pub mod job_progress;
pub mod system_status;
pub mod worker_status;

/// Everything a poller task needs
#[derive(Clone)]
pub struct PollContext {
    pub hub: Arc<Hub>,
    pub engine: EngineClient,
    pub breaker: Arc<CircuitBreaker>,
    pub shutdown: watch::Receiver<bool>,
}

/// Start all pollers (one background task per category)
pub fn start_all(ctx: &PollContext) -> Vec<JoinHandle<()>> {
    let handles = vec![
        system_status::start(ctx.clone()),
        job_progress::start(ctx.clone()),
        worker_status::start(ctx.clone()),
    ];
    logger::info(
        LogTag::Poller,
        "Pollers started (system-status, job-progress, worker-status)",
    );
    handles
}

/// Publish the outcome of one poll cycle.
///
/// On success the mapped payload becomes the new last-known-good and is
/// published fresh. On failure (engine error or breaker rejection) the cached
/// payload, when one exists, is republished with the stale marker; with no
/// cache the cycle publishes nothing. Returns the delivery count.
pub(crate) async fn publish_cycle(
    hub: &Hub,
    category: EventCategory,
    outcome: Result<Value, GatewayError>,
    map: fn(Value) -> Result<Value, serde_json::Error>,
    last_good: &mut Option<Value>,
) -> usize {
    match outcome {
        Ok(raw) => match map(raw) {
            Ok(payload) => {
                *last_good = Some(payload.clone());
                let delivered = hub.publish(category, payload, false).await;
                logger::debug(
                    LogTag::Poller,
                    &format!("{} published (delivered={})", category, delivered),
                );
                delivered
            }
            Err(e) => {
                // Engine answered but with a shape we don't understand;
                // don't poison the cache with it.
                logger::warning(
                    LogTag::Poller,
                    &format!("{} payload mapping failed: {}", category, e),
                );
                0
            }
        },
        Err(e) => {
            match &e {
                GatewayError::CircuitOpen { .. } => {
                    logger::debug(LogTag::Poller, &format!("{} poll skipped: {}", category, e));
                }
                _ => {
                    logger::warning(LogTag::Poller, &format!("{} poll failed: {}", category, e));
                }
            }
            match last_good {
                Some(cached) => hub.publish(category, cached.clone(), true).await,
                None => 0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::engine::BreakerSettings;
    use crate::errors::EngineError;
    use serde_json::json;
    use std::time::Duration;

    fn identity_map(raw: Value) -> Result<Value, serde_json::Error> {
        Ok(raw)
    }

    fn engine_failure() -> GatewayError {
        GatewayError::Engine(EngineError::Timeout {
            endpoint: "http://127.0.0.1:9070/rpc".to_string(),
            timeout_ms: 100,
        })
    }

    #[tokio::test]
    async fn test_success_publishes_and_caches() {
        let hub = Hub::new(8);
        let (_id, mut rx) = hub.register().await;
        let mut last_good = None;

        let delivered = publish_cycle(
            &hub,
            EventCategory::SystemStatus,
            Ok(json!({"cpu": 12})),
            identity_map,
            &mut last_good,
        )
        .await;

        assert_eq!(delivered, 1);
        assert_eq!(last_good, Some(json!({"cpu": 12})));
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.stale, None);
    }

    #[tokio::test]
    async fn test_failure_republishes_stale_cache() {
        let hub = Hub::new(8);
        let (_id, mut rx) = hub.register().await;
        let mut last_good = Some(json!({"cpu": 55}));

        let delivered = publish_cycle(
            &hub,
            EventCategory::SystemStatus,
            Err(engine_failure()),
            identity_map,
            &mut last_good,
        )
        .await;

        assert_eq!(delivered, 1);
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.stale, Some(true));
        assert_eq!(envelope.data, json!({"cpu": 55}));
    }

    #[tokio::test]
    async fn test_failure_without_cache_publishes_nothing() {
        let hub = Hub::new(8);
        let (_id, mut rx) = hub.register().await;
        let mut last_good = None;

        let delivered = publish_cycle(
            &hub,
            EventCategory::SystemStatus,
            Err(GatewayError::CircuitOpen {
                retry_after: Duration::from_secs(5),
            }),
            identity_map,
            &mut last_good,
        )
        .await;

        assert_eq!(delivered, 0);
        assert!(rx.try_recv().is_err());
        assert!(last_good.is_none());
    }

    #[tokio::test]
    async fn test_start_all_stops_on_shutdown() {
        // Nothing listens on the default engine port; every poll fails fast
        // and is absorbed, which is exactly the outage path.
        let hub = Hub::new(8);
        let engine = config::with_config(|cfg| EngineClient::new(&cfg.engine));
        let breaker = Arc::new(CircuitBreaker::new("engine", BreakerSettings::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = PollContext {
            hub,
            engine,
            breaker,
            shutdown: shutdown_rx,
        };
        let handles = start_all(&ctx);
        assert_eq!(handles.len(), 3);

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let drained = tokio::time::timeout(
            Duration::from_secs(5),
            futures::future::join_all(handles),
        )
        .await
        .unwrap();
        assert!(drained.into_iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_categories_publish_on_independent_schedules() {
        let hub = Hub::new(64);
        let (id, mut rx) = hub.register().await;
        hub.subscribe(id, &[EventCategory::JobProgress]).await;

        // Two timers on different cadences feeding the same hub; neither
        // may block the other's schedule.
        let fast_hub = hub.clone();
        let fast = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(10));
            let mut last_good = None;
            for _ in 0..8 {
                ticker.tick().await;
                publish_cycle(
                    &fast_hub,
                    EventCategory::JobProgress,
                    Ok(json!({"jobs": []})),
                    identity_map,
                    &mut last_good,
                )
                .await;
            }
        });
        let slow_hub = hub.clone();
        let slow = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(40));
            let mut last_good = None;
            for _ in 0..3 {
                ticker.tick().await;
                publish_cycle(
                    &slow_hub,
                    EventCategory::SystemStatus,
                    Ok(json!({"cpu": 1})),
                    identity_map,
                    &mut last_good,
                )
                .await;
            }
        });
        fast.await.unwrap();
        slow.await.unwrap();

        let mut fast_count = 0;
        let mut slow_count = 0;
        while let Ok(envelope) = rx.try_recv() {
            match envelope.kind.as_str() {
                "job-progress" => fast_count += 1,
                "system-status" => slow_count += 1,
                other => panic!("unexpected envelope type {}", other),
            }
        }
        assert_eq!(fast_count, 8);
        assert_eq!(slow_count, 3);
    }

    #[tokio::test]
    async fn test_mapping_failure_keeps_previous_cache() {
        let hub = Hub::new(8);
        let (_id, _rx) = hub.register().await;
        let mut last_good = Some(json!({"cpu": 1}));

        fn rejecting_map(raw: Value) -> Result<Value, serde_json::Error> {
            serde_json::from_value::<u64>(raw).map(Value::from)
        }

        let delivered = publish_cycle(
            &hub,
            EventCategory::SystemStatus,
            Ok(json!({"not": "a number"})),
            rejecting_map,
            &mut last_good,
        )
        .await;

        assert_eq!(delivered, 0);
        assert_eq!(last_good, Some(json!({"cpu": 1})));
    }
}
