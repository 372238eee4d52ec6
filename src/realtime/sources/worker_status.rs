/// Worker status poller
///
/// Worker membership changes slowly, so this poller runs on the longest
/// cadence of the three.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::config;
use crate::logger::{self, LogTag};
use crate::realtime::message::EventCategory;

use super::{publish_cycle, PollContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatusSnapshot {
    #[serde(default)]
    pub workers: Vec<WorkerStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_job: Option<String>,
    #[serde(default)]
    pub tasks_completed: u64,
}

pub fn start(ctx: PollContext) -> JoinHandle<()> {
    tokio::spawn(run(ctx))
}

async fn run(mut ctx: PollContext) {
    let interval_secs =
        config::with_config(|cfg| cfg.poller.worker_status_interval_secs.max(1));
    let mut ticker = interval(Duration::from_secs(interval_secs));
    let mut last_good: Option<Value> = None;

    logger::debug(
        LogTag::Poller,
        &format!("worker-status poller running every {}s", interval_secs),
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
                    .call(|| async move { engine.query("workers.status", json!({})).await })
                    .await;
                publish_cycle(
                    &ctx.hub,
                    EventCategory::WorkerStatus,
                    outcome,
                    map_payload,
                    &mut last_good,
                )
                .await;
            }
        }
    }

    logger::debug(LogTag::Poller, "worker-status poller stopped");
}

fn map_payload(raw: Value) -> Result<Value, serde_json::Error> {
    let snapshot: WorkerStatusSnapshot = serde_json::from_value(raw)?;
    serde_json::to_value(&snapshot)
}
