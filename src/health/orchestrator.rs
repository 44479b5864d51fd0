//! Health orchestrator.
//!
//! # Data Flow
//! ```text
//! evaluate(mode)
//!     LIVENESS  → uptime + metadata, no dependency consulted
//!     READINESS → spawn one task per dependency
//!                   → breaker.call(executor.probe)
//!               → join all, bounded by max(timeout) + grace
//!               → state::aggregate
//!     DEEP      → READINESS + latency history + process diagnostics
//! ```
//!
//! # Design Decisions
//! - Probe tasks are detached: a caller that goes away does not cancel them,
//!   so breaker bookkeeping always completes
//! - Every spawned probe is observed exactly once (result, panic or deadline)
//! - A probe that does not report in time counts as a failing check

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::health::diagnostics::{self, ProcessDiagnostics};
use crate::health::executor::Probe;
use crate::health::probe::ProbeResult;
use crate::health::registry::{Dependency, DependencyRegistry};
use crate::health::state::{aggregate, CheckStatus, HealthStatus};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::BreakerSnapshot;
use crate::resilience::clock::SharedClock;

/// Message for a check whose probe task never reported back.
pub const PROBE_INCOMPLETE_MESSAGE: &str = "probe did not complete";

/// Message for a dependency that no evaluation has reached yet.
pub const NOT_YET_CHECKED_MESSAGE: &str = "not yet checked";

/// Extra time granted on top of the largest probe timeout before fan-in gives up.
pub const DEFAULT_FAN_IN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    Liveness,
    Readiness,
    Deep,
}

impl EvaluationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationMode::Liveness => "liveness",
            EvaluationMode::Readiness => "readiness",
            EvaluationMode::Deep => "deep",
        }
    }
}

/// Identity of the running service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetadata {
    pub name: String,
    pub version: String,
    pub environment: String,
    pub instance_id: Uuid,
}

impl ServiceMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            environment: environment.into(),
            instance_id: Uuid::new_v4(),
        }
    }
}

/// Latest outcome for one dependency.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: String,
    pub kind: &'static str,
    pub critical: bool,
    pub status: CheckStatus,
    pub result: ProbeResult,
    /// Breaker state and window statistics. `history` is only filled for DEEP.
    pub breaker: BreakerSnapshot,
}

/// Combined view over all dependencies.
#[derive(Debug, Clone)]
pub struct AggregatedHealth {
    pub mode: EvaluationMode,
    pub status: HealthStatus,
    pub checks: Vec<CheckOutcome>,
    pub uptime: Duration,
    pub service: ServiceMetadata,
    pub timestamp: DateTime<Utc>,
    pub diagnostics: Option<ProcessDiagnostics>,
}

impl AggregatedHealth {
    pub fn check(&self, name: &str) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// Runs dependency checks and aggregates them. Constructed once at startup and
/// handed to the HTTP layer.
pub struct HealthOrchestrator {
    registry: Arc<DependencyRegistry>,
    probe: Arc<dyn Probe>,
    clock: SharedClock,
    started_at: Instant,
    metadata: ServiceMetadata,
    fan_in_grace: Duration,
}

impl HealthOrchestrator {
    pub fn new(registry: Arc<DependencyRegistry>, probe: Arc<dyn Probe>, metadata: ServiceMetadata) -> Self {
        let clock = registry.clock().clone();
        let started_at = clock.now();
        Self {
            registry,
            probe,
            clock,
            started_at,
            metadata,
            fan_in_grace: DEFAULT_FAN_IN_GRACE,
        }
    }

    pub fn with_fan_in_grace(mut self, grace: Duration) -> Self {
        self.fan_in_grace = grace;
        self
    }

    pub fn registry(&self) -> &DependencyRegistry {
        &self.registry
    }

    pub fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    /// Longest a READINESS or DEEP evaluation can wait on its probes.
    pub fn evaluation_budget(&self) -> Duration {
        let max_timeout = self
            .registry
            .all()
            .iter()
            .map(|d| d.descriptor.timeout)
            .max()
            .unwrap_or_default();
        max_timeout + self.fan_in_grace
    }

    pub fn uptime(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started_at)
    }

    /// Process-alive view. Never touches a dependency and never suspends.
    pub fn liveness(&self) -> AggregatedHealth {
        metrics::record_evaluation(EvaluationMode::Liveness.as_str(), HealthStatus::Healthy.as_str());
        AggregatedHealth {
            mode: EvaluationMode::Liveness,
            status: HealthStatus::Healthy,
            checks: Vec::new(),
            uptime: self.uptime(),
            service: self.metadata.clone(),
            timestamp: Utc::now(),
            diagnostics: None,
        }
    }

    pub async fn evaluate(&self, mode: EvaluationMode) -> AggregatedHealth {
        let (checks, diagnostics) = match mode {
            EvaluationMode::Liveness => return self.liveness(),
            EvaluationMode::Readiness => (self.run_checks(false).await, None),
            EvaluationMode::Deep => {
                let (checks, diagnostics) = tokio::join!(self.run_checks(true), diagnostics::collect());
                (checks, Some(diagnostics))
            }
        };

        let status = aggregate(checks.iter().map(|c| (c.critical, c.status)));
        metrics::record_evaluation(mode.as_str(), status.as_str());
        if status != HealthStatus::Healthy {
            let failing: Vec<&str> = checks
                .iter()
                .filter(|c| !c.status.is_healthy())
                .map(|c| c.name.as_str())
                .collect();
            tracing::debug!(mode = mode.as_str(), %status, ?failing, "Dependencies failing");
        }

        AggregatedHealth {
            mode,
            status,
            checks,
            uptime: self.uptime(),
            service: self.metadata.clone(),
            timestamp: Utc::now(),
            diagnostics,
        }
    }

    /// DEEP-shaped view built from each breaker's latest result. Runs no check
    /// and moves no breaker; a dependency never checked counts as failing.
    pub async fn observe(&self) -> AggregatedHealth {
        let checks: Vec<CheckOutcome> = self
            .registry
            .all()
            .iter()
            .map(|dependency| {
                let result = dependency.breaker.snapshot(false).latest.unwrap_or_else(|| {
                    ProbeResult::failure(NOT_YET_CHECKED_MESSAGE, Duration::ZERO)
                        .with_detail("error", "pending")
                });
                outcome(dependency, result, false)
            })
            .collect();

        AggregatedHealth {
            mode: EvaluationMode::Deep,
            status: aggregate(checks.iter().map(|c| (c.critical, c.status))),
            checks,
            uptime: self.uptime(),
            service: self.metadata.clone(),
            timestamp: Utc::now(),
            diagnostics: Some(diagnostics::collect().await),
        }
    }

    /// Fan out one task per dependency, then fan in under a single deadline.
    async fn run_checks(&self, include_history: bool) -> Vec<CheckOutcome> {
        let dependencies = self.registry.all();
        if dependencies.is_empty() {
            return Vec::new();
        }

        let max_timeout = dependencies
            .iter()
            .map(|d| d.descriptor.timeout)
            .max()
            .unwrap_or_default();
        let deadline = tokio::time::Instant::now() + max_timeout + self.fan_in_grace;

        let handles: Vec<_> = dependencies
            .iter()
            .map(|dependency| {
                let breaker = dependency.breaker.clone();
                let descriptor = dependency.descriptor.clone();
                let probe = self.probe.clone();
                tokio::spawn(async move { breaker.call(|| probe.probe(&descriptor)).await })
            })
            .collect();

        let joined = join_all(
            handles
                .into_iter()
                .map(|handle| tokio::time::timeout_at(deadline, handle)),
        )
        .await;

        dependencies
            .iter()
            .zip(joined)
            .map(|(dependency, joined)| {
                let result = match joined {
                    Ok(Ok(result)) => result,
                    Ok(Err(join_error)) => {
                        tracing::error!(
                            dependency = %dependency.name(),
                            error = %join_error,
                            "Probe task aborted"
                        );
                        ProbeResult::failure(PROBE_INCOMPLETE_MESSAGE, Duration::ZERO)
                            .with_detail("error", "aborted")
                    }
                    Err(_) => {
                        tracing::warn!(
                            dependency = %dependency.name(),
                            deadline = ?(max_timeout + self.fan_in_grace),
                            "Probe missed the evaluation deadline"
                        );
                        ProbeResult::failure(PROBE_INCOMPLETE_MESSAGE, max_timeout + self.fan_in_grace)
                            .with_detail("error", "deadline")
                    }
                };
                outcome(dependency, result, include_history)
            })
            .collect()
    }
}

fn outcome(dependency: &Dependency, result: ProbeResult, include_history: bool) -> CheckOutcome {
    CheckOutcome {
        name: dependency.name().to_string(),
        kind: dependency.descriptor.kind.label(),
        critical: dependency.descriptor.critical,
        status: CheckStatus::from_success(result.success),
        result,
        breaker: dependency.breaker.snapshot(include_history),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::health::probe::DependencyDescriptor;
    use crate::resilience::circuit_breaker::{BreakerSettings, CircuitState};
    use crate::resilience::clock::{ManualClock, SystemClock};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone)]
    pub(crate) enum Behavior {
        Pass,
        Fail,
        Slow(Duration),
        Panic,
        Switch(Arc<AtomicBool>),
    }

    /// Scripted probe that counts calls per dependency.
    #[derive(Debug, Default)]
    pub(crate) struct FakeProbe {
        behaviors: HashMap<String, Behavior>,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl FakeProbe {
        pub(crate) fn with(mut self, name: &str, behavior: Behavior) -> Self {
            self.behaviors.insert(name.to_string(), behavior);
            self
        }

        pub(crate) fn calls(&self, name: &str) -> u32 {
            self.calls.lock().get(name).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Probe for FakeProbe {
        async fn probe(&self, descriptor: &DependencyDescriptor) -> ProbeResult {
            *self.calls.lock().entry(descriptor.name.clone()).or_default() += 1;
            match self.behaviors.get(&descriptor.name).cloned().unwrap_or(Behavior::Pass) {
                Behavior::Pass => ProbeResult::success("ok", Duration::from_millis(1)),
                Behavior::Fail => ProbeResult::failure("connection refused", Duration::from_millis(1)),
                Behavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    ProbeResult::success("slow ok", delay)
                }
                Behavior::Panic => panic!("probe blew up"),
                Behavior::Switch(up) => {
                    if up.load(Ordering::SeqCst) {
                        ProbeResult::success("ok", Duration::from_millis(1))
                    } else {
                        ProbeResult::failure("down", Duration::from_millis(1))
                    }
                }
            }
        }
    }

    fn orchestrator(
        deps: Vec<DependencyDescriptor>,
        probe: Arc<FakeProbe>,
        settings: BreakerSettings,
        clock: SharedClock,
    ) -> HealthOrchestrator {
        let mut registry = DependencyRegistry::new(settings, clock);
        for d in deps {
            registry.register(d).unwrap();
        }
        HealthOrchestrator::new(
            Arc::new(registry),
            probe,
            ServiceMetadata::new("orders", "1.0.0", "test"),
        )
    }

    fn tcp(name: &str, timeout_ms: u64) -> DependencyDescriptor {
        DependencyDescriptor::tcp(name, "127.0.0.1:1", Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_liveness_ignores_dependencies() {
        let probe = Arc::new(FakeProbe::default().with("db", Behavior::Slow(Duration::from_secs(30))));
        let orch = orchestrator(
            vec![tcp("db", 60_000)],
            probe.clone(),
            BreakerSettings::default(),
            Arc::new(SystemClock),
        );

        let started = Instant::now();
        let first = orch.evaluate(EvaluationMode::Liveness).await;
        let second = orch.evaluate(EvaluationMode::Liveness).await;
        assert!(started.elapsed() < Duration::from_millis(10));

        assert_eq!(first.status, HealthStatus::Healthy);
        assert_eq!(first.status, second.status);
        assert!(second.uptime >= first.uptime);
        assert!(first.checks.is_empty());
        assert_eq!(probe.calls("db"), 0);
    }

    #[tokio::test]
    async fn test_advisory_failure_degrades_readiness() {
        let probe = Arc::new(FakeProbe::default().with("db", Behavior::Pass).with("peer", Behavior::Fail));
        let orch = orchestrator(
            vec![tcp("db", 1000), tcp("peer", 1000).critical(false)],
            probe,
            BreakerSettings::default(),
            Arc::new(SystemClock),
        );

        let health = orch.evaluate(EvaluationMode::Readiness).await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.check("peer").unwrap().status, CheckStatus::Unhealthy);
        assert_eq!(health.check("db").unwrap().status, CheckStatus::Healthy);
    }

    #[tokio::test]
    async fn test_critical_failure_is_unhealthy() {
        let probe = Arc::new(FakeProbe::default().with("db", Behavior::Fail));
        let orch = orchestrator(
            vec![tcp("db", 1000), tcp("peer", 1000).critical(false)],
            probe,
            BreakerSettings::default(),
            Arc::new(SystemClock),
        );

        let health = orch.evaluate(EvaluationMode::Readiness).await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_run_concurrently() {
        let probe = Arc::new(
            FakeProbe::default()
                .with("a", Behavior::Slow(Duration::from_millis(200)))
                .with("b", Behavior::Slow(Duration::from_millis(200)))
                .with("c", Behavior::Slow(Duration::from_millis(200))),
        );
        let orch = orchestrator(
            vec![tcp("a", 1000), tcp("b", 1000), tcp("c", 1000)],
            probe,
            BreakerSettings::default(),
            Arc::new(SystemClock),
        );

        let started = tokio::time::Instant::now();
        let health = orch.evaluate(EvaluationMode::Readiness).await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_in_deadline_marks_straggler_failed() {
        // The fake ignores its descriptor timeout, so only the fan-in bound stops it.
        let probe = Arc::new(
            FakeProbe::default()
                .with("stuck", Behavior::Slow(Duration::from_secs(60)))
                .with("db", Behavior::Pass),
        );
        let orch = orchestrator(
            vec![tcp("db", 500), tcp("stuck", 100).critical(false)],
            probe,
            BreakerSettings::default(),
            Arc::new(SystemClock),
        );

        let started = tokio::time::Instant::now();
        let health = orch.evaluate(EvaluationMode::Readiness).await;
        assert!(started.elapsed() <= Duration::from_millis(500) + DEFAULT_FAN_IN_GRACE);

        let stuck = health.check("stuck").unwrap();
        assert_eq!(stuck.status, CheckStatus::Unhealthy);
        assert_eq!(stuck.result.message, PROBE_INCOMPLETE_MESSAGE);
        assert_eq!(health.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_panicking_probe_does_not_abort_others() {
        let probe = Arc::new(FakeProbe::default().with("broken", Behavior::Panic));
        let orch = orchestrator(
            vec![tcp("db", 1000), tcp("broken", 1000)],
            probe.clone(),
            BreakerSettings::default(),
            Arc::new(SystemClock),
        );

        let health = orch.evaluate(EvaluationMode::Readiness).await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.check("db").unwrap().status, CheckStatus::Healthy);
        assert_eq!(health.check("broken").unwrap().result.details["error"], "aborted");
        assert_eq!(probe.calls("db"), 1);
    }

    #[tokio::test]
    async fn test_breaker_short_circuits_through_orchestrator() {
        let clock = ManualClock::new();
        let up = Arc::new(AtomicBool::new(false));
        let probe = Arc::new(FakeProbe::default().with("db", Behavior::Switch(up.clone())));
        let settings = BreakerSettings {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            ..BreakerSettings::default()
        };
        let orch = orchestrator(vec![tcp("db", 1000)], probe.clone(), settings, Arc::new(clock.clone()));

        for t in 0..3 {
            clock.set_elapsed(Duration::from_secs(t));
            orch.evaluate(EvaluationMode::Readiness).await;
        }
        assert_eq!(probe.calls("db"), 3);

        clock.set_elapsed(Duration::from_secs(10));
        let health = orch.evaluate(EvaluationMode::Readiness).await;
        let db = health.check("db").unwrap();
        assert_eq!(db.breaker.state, CircuitState::Open);
        assert_eq!(db.result.message, "circuit open");
        assert_eq!(probe.calls("db"), 3);

        up.store(true, Ordering::SeqCst);
        clock.set_elapsed(Duration::from_secs(32));
        let health = orch.evaluate(EvaluationMode::Readiness).await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.check("db").unwrap().breaker.state, CircuitState::Closed);
        assert_eq!(probe.calls("db"), 4);
    }

    #[tokio::test]
    async fn test_dropped_caller_still_records_outcome() {
        let probe = Arc::new(FakeProbe::default().with("db", Behavior::Slow(Duration::from_millis(100))));
        let orch = Arc::new(orchestrator(
            vec![tcp("db", 1000)],
            probe,
            BreakerSettings::default(),
            Arc::new(SystemClock),
        ));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            orch.evaluate(EvaluationMode::Readiness),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let snapshot = orch.registry().get("db").unwrap().breaker.snapshot(false);
        assert_eq!(snapshot.total_successes, 1);
    }

    #[tokio::test]
    async fn test_observe_reads_latest_without_running_checks() {
        let probe = Arc::new(FakeProbe::default().with("db", Behavior::Fail));
        let orch = orchestrator(
            vec![tcp("db", 1000), tcp("cache", 1000).critical(false)],
            probe.clone(),
            BreakerSettings::default(),
            Arc::new(SystemClock),
        );

        let before = orch.observe().await;
        assert_eq!(before.check("db").unwrap().result.message, NOT_YET_CHECKED_MESSAGE);
        assert_eq!(before.status, HealthStatus::Unhealthy);
        assert_eq!(probe.calls("db"), 0);

        orch.evaluate(EvaluationMode::Readiness).await;
        let after = orch.observe().await;
        assert_eq!(after.check("db").unwrap().result.message, "connection refused");
        assert_eq!(after.check("cache").unwrap().status, CheckStatus::Healthy);
        assert_eq!(after.check("db").unwrap().breaker.total_failures, 1);
        assert!(after.diagnostics.is_some());
        assert_eq!(probe.calls("db"), 1);
        assert_eq!(probe.calls("cache"), 1);
    }

    #[test]
    fn test_evaluation_budget_covers_slowest_dependency() {
        let orch = orchestrator(
            vec![tcp("db", 2000), tcp("cache", 60_000)],
            Arc::new(FakeProbe::default()),
            BreakerSettings::default(),
            Arc::new(SystemClock),
        );
        assert_eq!(orch.evaluation_budget(), Duration::from_secs(60) + DEFAULT_FAN_IN_GRACE);
    }

    #[tokio::test]
    async fn test_deep_includes_history_and_diagnostics() {
        let probe = Arc::new(FakeProbe::default());
        let orch = orchestrator(
            vec![tcp("db", 1000)],
            probe,
            BreakerSettings::default(),
            Arc::new(SystemClock),
        );

        orch.evaluate(EvaluationMode::Readiness).await;
        let health = orch.evaluate(EvaluationMode::Deep).await;
        assert!(health.diagnostics.is_some());
        assert_eq!(health.check("db").unwrap().breaker.history.len(), 2);
    }
}
