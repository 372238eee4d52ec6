//! Circuit breaker state machine guarding gateway -> engine calls
//!
//! Closed: calls pass through normally. Open: calls are rejected without
//! attempting the operation until the cooldown elapses. HalfOpen: trial calls
//! probe recovery; enough consecutive successes close the circuit, any single
//! failure re-opens it and lengthens the cooldown.
//!
//! The breaker is a decision gate, not a retry policy. It never retries
//! internally and never bounds how long an attempted call may run.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::config::CircuitBreakerConfig;
use crate::errors::{EngineError, GatewayError};
use crate::logger::{self, LogTag};

/// Circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Immutable breaker tuning, derived from the config file
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub base_timeout: Duration,
    pub max_timeout: Duration,
    pub backoff_multiplier: f64,
}

impl BreakerSettings {
    pub fn from_config(cfg: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: cfg.failure_threshold,
            success_threshold: cfg.success_threshold,
            base_timeout: Duration::from_secs(cfg.base_timeout_secs),
            max_timeout: Duration::from_secs(cfg.max_timeout_secs),
            backoff_multiplier: cfg.backoff_multiplier,
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from_config(&CircuitBreakerConfig::default())
    }
}

/// All decision state lives behind one mutex so the "check state" and
/// "mutate on outcome" steps can never interleave into a lost update.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    /// Grows multiplicatively on repeated opens; resets to base_timeout
    /// only on transition into Closed.
    current_timeout: Duration,
    /// Set only while Open
    next_attempt_at: Option<Instant>,
}

/// Cumulative call and transition counters. Never cleared, not even by
/// `reset()` - these are historical observability data.
#[derive(Debug, Default)]
pub struct BreakerMetrics {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    rejected_calls: AtomicU64,
    opened_total: AtomicU64,
    half_opened_total: AtomicU64,
    closed_total: AtomicU64,
    last_failure_time: RwLock<Option<DateTime<Utc>>>,
    last_success_time: RwLock<Option<DateTime<Utc>>>,
}

impl BreakerMetrics {
    pub fn snapshot(&self) -> BreakerMetricsSnapshot {
        BreakerMetricsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
            opened_total: self.opened_total.load(Ordering::Relaxed),
            half_opened_total: self.half_opened_total.load(Ordering::Relaxed),
            closed_total: self.closed_total.load(Ordering::Relaxed),
            last_failure_time: *self.last_failure_time.read(),
            last_success_time: *self.last_success_time.read(),
        }
    }
}

/// Metrics snapshot (serializable)
#[derive(Debug, Clone, Serialize)]
pub struct BreakerMetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    pub opened_total: u64,
    pub half_opened_total: u64,
    pub closed_total: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
}

/// Circuit breaker for one protected dependency
pub struct CircuitBreaker {
    /// Dependency identifier (for logs and status)
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
    metrics: BreakerMetrics,
}

impl CircuitBreaker {
    pub fn new(name: &str, settings: BreakerSettings) -> Self {
        let current_timeout = settings.base_timeout;
        Self {
            name: name.to_string(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                current_timeout,
                next_attempt_at: None,
            }),
            metrics: BreakerMetrics::default(),
        }
    }

    pub fn with_defaults(name: &str) -> Self {
        Self::new(name, BreakerSettings::default())
    }

    /// Guard one call to the protected dependency.
    ///
    /// While Open and before the cooldown elapses, the operation is never
    /// invoked and `GatewayError::CircuitOpen` is returned immediately.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        self.metrics.total_calls.fetch_add(1, Ordering::Relaxed);

        if let Err(retry_after) = self.preflight() {
            self.metrics.rejected_calls.fetch_add(1, Ordering::Relaxed);
            return Err(GatewayError::CircuitOpen { retry_after });
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(GatewayError::Engine(e))
            }
        }
    }

    /// Decide whether the call may proceed; transitions Open -> HalfOpen
    /// when the cooldown has elapsed. Returns the remaining cooldown when
    /// the call must be rejected.
    fn preflight(&self) -> Result<(), Duration> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let now = Instant::now();
                match inner.next_attempt_at {
                    Some(at) if now < at => Err(at - now),
                    _ => {
                        inner.state = CircuitState::HalfOpen;
                        inner.failure_count = 0;
                        inner.success_count = 0;
                        inner.next_attempt_at = None;
                        self.metrics.half_opened_total.fetch_add(1, Ordering::Relaxed);
                        logger::debug(
                            LogTag::Breaker,
                            &format!("Circuit '{}' half-open, probing recovery", self.name),
                        );
                        Ok(())
                    }
                }
            }
        }
    }

    fn record_success(&self) {
        self.metrics
            .successful_calls
            .fetch_add(1, Ordering::Relaxed);
        *self.metrics.last_success_time.write() = Some(Utc::now());

        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                // A success clears accumulated failures - simple
                // reset-on-success policy, no sliding window.
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.settings.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.current_timeout = self.settings.base_timeout;
                    self.metrics.closed_total.fetch_add(1, Ordering::Relaxed);
                    logger::info(
                        LogTag::Breaker,
                        &format!("Circuit '{}' closed, engine recovered", self.name),
                    );
                }
            }
            CircuitState::Open => {
                // A call that started before the circuit opened can still
                // finish; its outcome no longer changes the state.
            }
        }
    }

    fn record_failure(&self, error: &EngineError) {
        self.metrics.failed_calls.fetch_add(1, Ordering::Relaxed);
        *self.metrics.last_failure_time.write() = Some(Utc::now());

        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.settings.failure_threshold {
                    self.trip_open(&mut inner, error);
                }
            }
            CircuitState::HalfOpen => {
                // Any single failure while probing re-opens the circuit
                self.trip_open(&mut inner, error);
            }
            CircuitState::Open => {}
        }
    }

    /// Transition into Open: arm the next attempt time with the current
    /// cooldown, then grow the cooldown for the next potential re-open.
    fn trip_open(&self, inner: &mut BreakerInner, error: &EngineError) {
        inner.state = CircuitState::Open;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.next_attempt_at = Some(Instant::now() + inner.current_timeout);

        let cooldown = inner.current_timeout;
        let grown = inner.current_timeout.as_secs_f64() * self.settings.backoff_multiplier;
        inner.current_timeout =
            Duration::from_secs_f64(grown.min(self.settings.max_timeout.as_secs_f64()));

        self.metrics.opened_total.fetch_add(1, Ordering::Relaxed);
        logger::warning(
            LogTag::Breaker,
            &format!(
                "Circuit '{}' opened ({}), next attempt in {:.1}s",
                self.name,
                error,
                cooldown.as_secs_f64()
            ),
        );
    }

    /// Operator override: force Closed with all counters zeroed and the
    /// cooldown back at base. Never invoked automatically. Metrics are
    /// cumulative and survive the reset.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.current_timeout = self.settings.base_timeout;
        inner.next_attempt_at = None;
        logger::info(
            LogTag::Breaker,
            &format!("Circuit '{}' manually reset to closed", self.name),
        );
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &BreakerMetrics {
        &self.metrics
    }

    /// Time until the circuit allows the next attempt, while Open
    pub fn time_until_attempt(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open => inner
                .next_attempt_at
                .map(|at| at.saturating_duration_since(Instant::now())),
            _ => None,
        }
    }

    /// Serializable status for the observability endpoint
    pub fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock();
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            current_timeout_secs: inner.current_timeout.as_secs_f64(),
            metrics: self.metrics.snapshot(),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("failure_count", &inner.failure_count)
            .field("success_count", &inner.success_count)
            .finish()
    }
}

/// Status of a circuit breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub current_timeout_secs: f64,
    pub metrics: BreakerMetricsSnapshot,
}
