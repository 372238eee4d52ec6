/// Job progress poller
///
/// Tracks long-running engine jobs (compression runs, volume scans, agent
/// tasks) on the fastest cadence of the three pollers, since progress bars
/// go visibly stale first.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::config;
use crate::logger::{self, LogTag};
use crate::realtime::message::EventCategory;

use super::{publish_cycle, PollContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgressSnapshot {
    #[serde(default)]
    pub jobs: Vec<JobProgress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    /// Job kind as reported by the engine (compression, scan, ...)
    pub kind: String,
    pub state: String,
    pub percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_secs: Option<u64>,
}

pub fn start(ctx: PollContext) -> JoinHandle<()> {
    tokio::spawn(run(ctx))
}

async fn run(mut ctx: PollContext) {
    let interval_secs =
        config::with_config(|cfg| cfg.poller.job_progress_interval_secs.max(1));
    let mut ticker = interval(Duration::from_secs(interval_secs));
    let mut last_good: Option<Value> = None;

    logger::debug(
        LogTag::Poller,
        &format!("job-progress poller running every {}s", interval_secs),
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
                    .call(|| async move { engine.query("jobs.progress", json!({})).await })
                    .await;
                publish_cycle(
                    &ctx.hub,
                    EventCategory::JobProgress,
                    outcome,
                    map_payload,
                    &mut last_good,
                )
                .await;
            }
        }
    }

    logger::debug(LogTag::Poller, "job-progress poller stopped");
}

fn map_payload(raw: Value) -> Result<Value, serde_json::Error> {
    let snapshot: JobProgressSnapshot = serde_json::from_value(raw)?;
    serde_json::to_value(&snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_payload() {
        let raw = json!({
            "jobs": [
                {"job_id": "j-17", "kind": "compression", "state": "running", "percent": 62.5, "eta_secs": 120},
                {"job_id": "j-18", "kind": "scan", "state": "queued", "percent": 0.0}
            ]
        });

        let payload = map_payload(raw).unwrap();
        assert_eq!(payload["jobs"][0]["job_id"], "j-17");
        assert_eq!(payload["jobs"][0]["eta_secs"], 120);
        // Absent eta is omitted, not null
        assert!(payload["jobs"][1].get("eta_secs").is_none());
    }

    #[test]
    fn test_map_payload_empty_job_list() {
        let payload = map_payload(json!({})).unwrap();
        assert_eq!(payload["jobs"], json!([]));
    }
}
