/// Connection keepalive tracking
///
/// Each connection independently probes its client with JSON ping envelopes
/// and treats a missed reply (or prolonged silence) as a dead connection.
use std::time::{Duration, Instant};

use crate::config::WebSocketConfig;

// ============================================================================
// KEEPALIVE CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Interval between server pings
    pub interval: Duration,

    /// How long to wait for a pong after a ping
    pub grace_period: Duration,

    /// Close clients silent for longer than this
    pub idle_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            grace_period: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(90),
        }
    }
}

impl KeepaliveConfig {
    pub fn from_config(cfg: &WebSocketConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.keepalive_interval_secs),
            grace_period: Duration::from_secs(cfg.keepalive_grace_secs),
            idle_timeout: Duration::from_secs(cfg.client_idle_timeout_secs),
        }
    }
}

// ============================================================================
// KEEPALIVE TRACKER
// ============================================================================

/// Per-connection liveness state, driven by the connection's check tick
#[derive(Debug)]
pub struct KeepaliveTracker {
    /// Last inbound activity (any client message)
    last_activity: Instant,

    /// Outstanding ping awaiting a reply
    pending_ping: Option<Instant>,

    config: KeepaliveConfig,
}

impl KeepaliveTracker {
    pub fn new(config: KeepaliveConfig) -> Self {
        Self {
            last_activity: Instant::now(),
            pending_ping: None,
            config,
        }
    }

    /// Record client activity; clears any outstanding ping
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
        self.pending_ping = None;
    }

    /// Record that a ping was sent
    pub fn record_ping(&mut self) {
        self.pending_ping = Some(Instant::now());
    }

    /// A ping is due when the client has been quiet for a full interval
    /// and no ping is already outstanding
    pub fn needs_ping(&self) -> bool {
        self.pending_ping.is_none() && self.last_activity.elapsed() > self.config.interval
    }

    /// The outstanding ping went unanswered past the grace period
    pub fn is_overdue(&self) -> bool {
        self.pending_ping
            .map(|sent| sent.elapsed() > self.config.grace_period)
            .unwrap_or(false)
    }

    /// No inbound traffic at all for the idle timeout
    pub fn is_idle(&self) -> bool {
        self.last_activity.elapsed() > self.config.idle_timeout
    }

    pub fn seconds_since_activity(&self) -> u64 {
        self.last_activity.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_keepalive_tracker() {
        let config = KeepaliveConfig {
            interval: Duration::from_millis(40),
            grace_period: Duration::from_millis(30),
            idle_timeout: Duration::from_millis(120),
        };
        let mut tracker = KeepaliveTracker::new(config);

        assert!(!tracker.needs_ping());
        assert!(!tracker.is_idle());

        // Quiet past the interval: ping is due
        sleep(Duration::from_millis(50));
        assert!(tracker.needs_ping());

        // Outstanding ping suppresses further pings, then goes overdue
        tracker.record_ping();
        assert!(!tracker.needs_ping());
        assert!(!tracker.is_overdue());
        sleep(Duration::from_millis(40));
        assert!(tracker.is_overdue());

        // A pong clears the outstanding ping
        tracker.record_activity();
        assert!(!tracker.is_overdue());

        // Total silence eventually counts as idle
        sleep(Duration::from_millis(130));
        assert!(tracker.is_idle());
    }
}
