/// System status poller
///
/// Periodically queries `system.status` on the engine and publishes the
/// snapshot on the always-on system-status category.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::config;
use crate::logger::{self, LogTag};
use crate::realtime::message::EventCategory;

use super::{publish_cycle, PollContext};

/// Snapshot of overall appliance health as reported by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatusSnapshot {
    pub uptime_secs: u64,
    pub cpu_percent: f64,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    #[serde(default)]
    pub volumes: Vec<VolumeStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeStatus {
    pub name: String,
    pub used_gb: f64,
    pub capacity_gb: f64,
    pub healthy: bool,
}

pub fn start(ctx: PollContext) -> JoinHandle<()> {
    tokio::spawn(run(ctx))
}

async fn run(mut ctx: PollContext) {
    let interval_secs =
        config::with_config(|cfg| cfg.poller.system_status_interval_secs.max(1));
    let mut ticker = interval(Duration::from_secs(interval_secs));
    let mut last_good: Option<Value> = None;

    logger::debug(
        LogTag::Poller,
        &format!("system-status poller running every {}s", interval_secs),
    );

    loop {
        tokio::select! {
            changed = ctx.shutdown.changed() => {
                if changed.is_err() || *ctx.shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let engine = ctx.engine.clone();
                let outcome = ctx
                    .breaker
                    .call(|| async move { engine.query("system.status", json!({})).await })
                    .await;
                publish_cycle(
                    &ctx.hub,
                    EventCategory::SystemStatus,
                    outcome,
                    map_payload,
                    &mut last_good,
                )
                .await;
            }
        }
    }

    logger::debug(LogTag::Poller, "system-status poller stopped");
}

/// Validate the raw engine response against the snapshot shape
fn map_payload(raw: Value) -> Result<Value, serde_json::Error> {
    let snapshot: SystemStatusSnapshot = serde_json::from_value(raw)?;
    serde_json::to_value(&snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_payload() {
        let raw = json!({
            "uptime_secs": 86400,
            "cpu_percent": 12.5,
            "memory_used_mb": 2048,
            "memory_total_mb": 8192,
            "volumes": [
                {"name": "volume1", "used_gb": 412.0, "capacity_gb": 1024.0, "healthy": true}
            ]
        });

        let payload = map_payload(raw).unwrap();
        assert_eq!(payload["volumes"][0]["name"], "volume1");
        assert_eq!(payload["memory_total_mb"], 8192);
    }

    #[test]
    fn test_map_payload_tolerates_missing_volumes() {
        let raw = json!({
            "uptime_secs": 10,
            "cpu_percent": 1.0,
            "memory_used_mb": 100,
            "memory_total_mb": 4096
        });
        let payload = map_payload(raw).unwrap();
        assert_eq!(payload["volumes"], json!([]));
    }

    #[test]
    fn test_map_payload_rejects_malformed() {
        assert!(map_payload(json!({"bogus": true})).is_err());
        assert!(map_payload(json!("not an object")).is_err());
    }
}
