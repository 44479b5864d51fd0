//! Circuit breaker for dependency probes.
//!
//! # States
//! - Closed: normal operation, every call probes the dependency
//! - Open: dependency assumed down, calls fail fast with a synthesized result
//! - Half-Open: a single trial probe tests whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call after recovery_timeout since the last failure
//! Half-Open → Closed: consecutive trial successes >= success_threshold
//! Half-Open → Open: first trial failure (recovery timer restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per dependency, never shared
//! - Fail fast in Open state (no probe, zero duration)
//! - Single trial in flight while Half-Open; concurrent callers are short-circuited
//! - Counters, state and the rolling window live behind one lock, so a probe
//!   outcome is applied atomically and costs a single lock acquisition
//! - The lock is never held across the probe itself

use parking_lot::RwLock;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::health::probe::ProbeResult;
use crate::health::window::{RollingWindow, Sample};
use crate::observability::metrics;
use crate::resilience::clock::SharedClock;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Tuning for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
    /// Capacity of the rolling window of probe samples.
    pub window_size: usize,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(30),
            window_size: 20,
        }
    }
}

/// What a caller is allowed to do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Regular probe while closed.
    Probe,
    /// The single half-open trial.
    Trial,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
    window: RollingWindow,
    latest: Option<ProbeResult>,
}

/// Point-in-time copy of a breaker, taken under the read lock.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
    /// Time left before an open breaker admits a trial.
    pub retry_in: Option<Duration>,
    pub latest: Option<ProbeResult>,
    pub success_ratio: Option<f64>,
    pub average_latency_ms: Option<f64>,
    pub total_successes: u64,
    pub total_failures: u64,
    pub short_circuits: u64,
    pub history: Vec<Sample>,
}

/// Per-dependency circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    clock: SharedClock,
    inner: RwLock<BreakerInner>,
}

enum Transition {
    Opened { failures: u32 },
    Reopened,
    HalfOpened,
    Closed,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings, clock: SharedClock) -> Self {
        let name = name.into();
        metrics::set_circuit_state(&name, CircuitState::Closed);
        Self {
            name,
            inner: RwLock::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure: None,
                trial_in_flight: false,
                window: RollingWindow::new(settings.window_size),
                latest: None,
            }),
            settings,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Current state as last recorded. An open breaker whose recovery timeout
    /// has elapsed still reads as open until the next call admits a trial.
    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Run `probe` through the breaker.
    ///
    /// While open (and during another caller's half-open trial) `probe` is not
    /// invoked and a failed "circuit open" result is returned instead.
    pub async fn call<F, Fut>(&self, probe: F) -> ProbeResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProbeResult>,
    {
        let admission = match self.admit() {
            Some(admission) => admission,
            None => return ProbeResult::circuit_open(),
        };

        let mut guard = AdmissionGuard {
            breaker: self,
            admission,
            armed: true,
        };
        let result = probe().await;
        guard.armed = false;
        self.record(admission, &result);
        result
    }

    /// Decide under the write lock whether a real probe may run. A rejected
    /// call is recorded as a short-circuit before the lock is released.
    fn admit(&self) -> Option<Admission> {
        let mut inner = self.inner.write();
        let mut transition = None;

        let admission = match inner.state {
            CircuitState::Closed => Some(Admission::Probe),
            CircuitState::Open => {
                if self.recovery_elapsed(&inner) {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    inner.trial_in_flight = true;
                    transition = Some(Transition::HalfOpened);
                    Some(Admission::Trial)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(Admission::Trial)
                }
            }
        };

        if admission.is_none() {
            inner.window.record_short_circuit();
            inner.latest = Some(ProbeResult::circuit_open());
        }
        drop(inner);

        if admission.is_none() {
            metrics::record_short_circuit(&self.name);
        }
        if let Some(t) = transition {
            self.announce(t);
        }
        admission
    }

    fn recovery_elapsed(&self, inner: &BreakerInner) -> bool {
        match inner.last_failure {
            Some(at) => self.clock.now().saturating_duration_since(at) >= self.settings.recovery_timeout,
            None => true,
        }
    }

    /// Apply a real probe outcome.
    fn record(&self, admission: Admission, result: &ProbeResult) {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        inner.window.record(result.success, result.duration, result.timestamp);
        inner.latest = Some(result.clone());

        let transition = match admission {
            Admission::Trial => {
                inner.trial_in_flight = false;
                if inner.state != CircuitState::HalfOpen {
                    // Breaker was reset while the trial ran.
                    None
                } else if result.success {
                    inner.consecutive_successes += 1;
                    if inner.consecutive_successes >= self.settings.success_threshold {
                        inner.state = CircuitState::Closed;
                        inner.consecutive_failures = 0;
                        inner.consecutive_successes = 0;
                        inner.last_failure = None;
                        Some(Transition::Closed)
                    } else {
                        None
                    }
                } else {
                    inner.state = CircuitState::Open;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    inner.last_failure = Some(now);
                    Some(Transition::Reopened)
                }
            }
            Admission::Probe => match inner.state {
                CircuitState::Closed if result.success => {
                    inner.consecutive_failures = 0;
                    None
                }
                CircuitState::Closed => {
                    inner.consecutive_failures += 1;
                    inner.last_failure = Some(now);
                    if inner.consecutive_failures >= self.settings.failure_threshold {
                        inner.state = CircuitState::Open;
                        Some(Transition::Opened {
                            failures: inner.consecutive_failures,
                        })
                    } else {
                        None
                    }
                }
                // A regular probe that started before the breaker opened.
                CircuitState::Open => {
                    if !result.success {
                        inner.last_failure = Some(now);
                    }
                    None
                }
                CircuitState::HalfOpen => None,
            },
        };
        drop(inner);

        if let Some(t) = transition {
            self.announce(t);
        }
    }

    fn release_trial(&self) {
        let mut inner = self.inner.write();
        inner.trial_in_flight = false;
    }

    fn announce(&self, transition: Transition) {
        match transition {
            Transition::Opened { failures } => {
                tracing::warn!(
                    dependency = %self.name,
                    failures,
                    recovery_timeout = ?self.settings.recovery_timeout,
                    "Circuit opened"
                );
                metrics::set_circuit_state(&self.name, CircuitState::Open);
            }
            Transition::Reopened => {
                tracing::warn!(dependency = %self.name, "Half-open trial failed, circuit re-opened");
                metrics::set_circuit_state(&self.name, CircuitState::Open);
            }
            Transition::HalfOpened => {
                tracing::info!(dependency = %self.name, "Recovery timeout elapsed, circuit half-open");
                metrics::set_circuit_state(&self.name, CircuitState::HalfOpen);
            }
            Transition::Closed => {
                tracing::info!(dependency = %self.name, "Circuit closed");
                metrics::set_circuit_state(&self.name, CircuitState::Closed);
            }
        }
    }

    /// Copy out state and window statistics for reporting.
    pub fn snapshot(&self, include_history: bool) -> BreakerSnapshot {
        let now = self.clock.now();
        let inner = self.inner.read();
        let retry_in = match (inner.state, inner.last_failure) {
            (CircuitState::Open, Some(at)) => Some(
                self.settings
                    .recovery_timeout
                    .saturating_sub(now.saturating_duration_since(at)),
            ),
            _ => None,
        };

        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            failure_threshold: self.settings.failure_threshold,
            success_threshold: self.settings.success_threshold,
            recovery_timeout: self.settings.recovery_timeout,
            retry_in,
            latest: inner.latest.clone(),
            success_ratio: inner.window.success_ratio(),
            average_latency_ms: inner.window.average_latency_ms(),
            total_successes: inner.window.total_successes(),
            total_failures: inner.window.total_failures(),
            short_circuits: inner.window.short_circuits(),
            history: if include_history {
                inner.window.history()
            } else {
                Vec::new()
            },
        }
    }

    /// Force the breaker back to closed. Window and counters for metrics are kept.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
        drop(inner);
        metrics::set_circuit_state(&self.name, CircuitState::Closed);
    }
}

/// Releases the half-open trial slot if the probe future is dropped before
/// it reports back.
struct AdmissionGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    armed: bool,
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.admission == Admission::Trial {
            tracing::debug!(dependency = %self.breaker.name, "Half-open trial abandoned");
            self.breaker.release_trial();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker(failure_threshold: u32, recovery_secs: u64) -> (Arc<CircuitBreaker>, ManualClock) {
        let clock = ManualClock::new();
        let settings = BreakerSettings {
            failure_threshold,
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(recovery_secs),
            window_size: 10,
        };
        let cb = CircuitBreaker::new("db", settings, Arc::new(clock.clone()));
        (Arc::new(cb), clock)
    }

    async fn fail(cb: &CircuitBreaker, calls: &AtomicU32) -> ProbeResult {
        cb.call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            ProbeResult::failure("connection refused", Duration::from_millis(3))
        })
        .await
    }

    async fn succeed(cb: &CircuitBreaker, calls: &AtomicU32) -> ProbeResult {
        cb.call(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            ProbeResult::success("ok", Duration::from_millis(2))
        })
        .await
    }

    #[tokio::test]
    async fn test_opens_exactly_at_threshold() {
        let (cb, _clock) = breaker(3, 30);
        let calls = AtomicU32::new(0);

        fail(&cb, &calls).await;
        fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot(false).consecutive_failures, 2);

        fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let (cb, _clock) = breaker(3, 30);
        let calls = AtomicU32::new(0);

        fail(&cb, &calls).await;
        fail(&cb, &calls).await;
        succeed(&cb, &calls).await;
        fail(&cb, &calls).await;
        fail(&cb, &calls).await;

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot(false).consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_recovery_scenario() {
        let (cb, clock) = breaker(3, 30);
        let calls = AtomicU32::new(0);

        // Failures at t=0, 1, 2.
        fail(&cb, &calls).await;
        clock.set_elapsed(Duration::from_secs(1));
        fail(&cb, &calls).await;
        clock.set_elapsed(Duration::from_secs(2));
        fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);
        calls.store(0, Ordering::SeqCst);

        // t=10: short-circuited, no probe.
        clock.set_elapsed(Duration::from_secs(10));
        let result = succeed(&cb, &calls).await;
        assert!(result.is_short_circuit());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.snapshot(false).retry_in, Some(Duration::from_secs(22)));

        // t=32: recovery elapsed since the last failure, one trial probe.
        clock.set_elapsed(Duration::from_secs(32));
        let result = succeed(&cb, &calls).await;
        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot(false).consecutive_failures, 0);

        // t=33: closed again, real probes resume.
        clock.set_elapsed(Duration::from_secs(33));
        succeed(&cb, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_trial_one_tick_before_recovery() {
        let (cb, clock) = breaker(1, 30);
        let calls = AtomicU32::new(0);

        fail(&cb, &calls).await;
        clock.advance(Duration::from_secs(29));
        let result = succeed(&cb, &calls).await;
        assert!(result.is_short_circuit());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_trial_reopens_and_restarts_timer() {
        let (cb, clock) = breaker(1, 30);
        let calls = AtomicU32::new(0);

        fail(&cb, &calls).await;
        clock.advance(Duration::from_secs(30));
        fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Timer restarted from the trial failure.
        clock.advance(Duration::from_secs(20));
        assert!(succeed(&cb, &calls).await.is_short_circuit());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        clock.advance(Duration::from_secs(10));
        assert!(succeed(&cb, &calls).await.success);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_concurrent_callers_do_not_duplicate_trial() {
        let (cb, clock) = breaker(1, 5);
        let calls = Arc::new(AtomicU32::new(0));

        fail(&cb, &calls).await;
        clock.advance(Duration::from_secs(5));

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial_cb = cb.clone();
        let trial_calls = calls.clone();
        let trial = tokio::spawn(async move {
            trial_cb
                .call(|| async move {
                    trial_calls.fetch_add(1, Ordering::SeqCst);
                    let _ = release_rx.await;
                    ProbeResult::success("ok", Duration::from_millis(1))
                })
                .await
        });

        while cb.state() != CircuitState::HalfOpen {
            tokio::task::yield_now().await;
        }

        let concurrent = succeed(&cb, &calls).await;
        assert!(concurrent.is_short_circuit());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        release_tx.send(()).unwrap();
        let trial_result = trial.await.unwrap();
        assert!(trial_result.success);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_releases_slot() {
        let (cb, clock) = breaker(1, 5);
        let calls = AtomicU32::new(0);

        fail(&cb, &calls).await;
        clock.advance(Duration::from_secs(5));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cb.call(|| std::future::pending::<ProbeResult>()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let result = succeed(&cb, &calls).await;
        assert!(result.success);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_threshold_requires_consecutive_trials() {
        let clock = ManualClock::new();
        let settings = BreakerSettings {
            failure_threshold: 1,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(1),
            window_size: 10,
        };
        let cb = CircuitBreaker::new("peer", settings, Arc::new(clock.clone()));
        let calls = AtomicU32::new(0);

        fail(&cb, &calls).await;
        clock.advance(Duration::from_secs(1));

        succeed(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_snapshot_tracks_window_and_short_circuits() {
        let (cb, _clock) = breaker(2, 30);
        let calls = AtomicU32::new(0);

        succeed(&cb, &calls).await;
        fail(&cb, &calls).await;
        fail(&cb, &calls).await;
        succeed(&cb, &calls).await;

        let snap = cb.snapshot(true);
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.total_successes, 1);
        assert_eq!(snap.total_failures, 2);
        assert_eq!(snap.short_circuits, 1);
        assert_eq!(snap.history.len(), 3);
        assert_eq!(snap.latest.map(|r| r.message), Some("circuit open".to_string()));
    }

    #[tokio::test]
    async fn test_reset_closes_breaker() {
        let (cb, _clock) = breaker(1, 30);
        let calls = AtomicU32::new(0);
        fail(&cb, &calls).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        succeed(&cb, &calls).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
