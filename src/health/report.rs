//! Response bodies for the health endpoints.
//!
//! # Views
//! - basic / liveness: status, service, timestamp, uptime
//! - readiness: basic + `checks` map + ready verdict
//! - deep: readiness + latency history + process diagnostics
//! - metrics: per-dependency counters, window ratios and breaker state
//!
//! Durations are serialized as milliseconds, uptime as seconds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::ReadinessConfig;
use crate::health::diagnostics::ProcessDiagnostics;
use crate::health::orchestrator::{AggregatedHealth, CheckOutcome, ServiceMetadata};
use crate::health::state::{CheckStatus, HealthStatus};
use crate::health::window::Sample;
use crate::resilience::circuit_breaker::CircuitState;

/// Whether a given overall status admits traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyPolicy {
    pub ready_on_degraded: bool,
}

impl Default for ReadyPolicy {
    fn default() -> Self {
        Self {
            ready_on_degraded: true,
        }
    }
}

impl From<&ReadinessConfig> for ReadyPolicy {
    fn from(config: &ReadinessConfig) -> Self {
        Self {
            ready_on_degraded: config.ready_on_degraded,
        }
    }
}

impl ReadyPolicy {
    pub fn is_ready(&self, status: HealthStatus) -> bool {
        match status {
            HealthStatus::Healthy => true,
            HealthStatus::Degraded => self.ready_on_degraded,
            HealthStatus::Unhealthy => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckBody {
    pub status: CheckStatus,
    pub message: String,
    /// Milliseconds.
    pub duration: f64,
    pub details: BTreeMap<String, Value>,
    pub kind: &'static str,
    pub critical: bool,
    pub circuit: CircuitState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Sample>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthBody {
    pub status: HealthStatus,
    pub service: ServiceMetadata,
    pub timestamp: DateTime<Utc>,
    /// Seconds.
    pub uptime: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<BTreeMap<String, CheckBody>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<ProcessDiagnostics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyMetrics {
    pub kind: &'static str,
    pub critical: bool,
    pub circuit: CircuitState,
    pub consecutive_failures: u32,
    pub total_probes: u64,
    pub successes: u64,
    pub failures: u64,
    pub short_circuits: u64,
    pub success_ratio: Option<f64>,
    pub average_latency_ms: Option<f64>,
    /// Milliseconds until an open breaker admits a trial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsBody {
    pub status: HealthStatus,
    pub service: ServiceMetadata,
    pub timestamp: DateTime<Utc>,
    pub uptime: f64,
    pub dependencies: BTreeMap<String, DependencyMetrics>,
    pub diagnostics: Option<ProcessDiagnostics>,
}

/// Renders orchestrator output into response bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter {
    policy: ReadyPolicy,
}

impl Reporter {
    pub fn new(policy: ReadyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ReadyPolicy {
        self.policy
    }

    /// `/health` and `/health/live`.
    pub fn basic(&self, health: &AggregatedHealth) -> HealthBody {
        envelope(health)
    }

    /// `/health/ready`. The flag tells the boundary whether to answer 200.
    pub fn readiness(&self, health: &AggregatedHealth) -> (bool, HealthBody) {
        let ready = self.policy.is_ready(health.status);
        let mut body = envelope(health);
        body.ready = Some(ready);
        body.checks = Some(checks(health, false));
        (ready, body)
    }

    /// `/health/deep`.
    pub fn deep(&self, health: &AggregatedHealth) -> HealthBody {
        let mut body = envelope(health);
        body.ready = Some(self.policy.is_ready(health.status));
        body.checks = Some(checks(health, true));
        body.diagnostics = health.diagnostics.clone();
        body
    }

    /// `/health/metrics`.
    pub fn metrics(&self, health: &AggregatedHealth) -> MetricsBody {
        let dependencies = health
            .checks
            .iter()
            .map(|check| (check.name.clone(), dependency_metrics(check)))
            .collect();

        MetricsBody {
            status: health.status,
            service: health.service.clone(),
            timestamp: health.timestamp,
            uptime: health.uptime.as_secs_f64(),
            dependencies,
            diagnostics: health.diagnostics.clone(),
        }
    }
}

fn envelope(health: &AggregatedHealth) -> HealthBody {
    HealthBody {
        status: health.status,
        service: health.service.clone(),
        timestamp: health.timestamp,
        uptime: health.uptime.as_secs_f64(),
        ready: None,
        checks: None,
        diagnostics: None,
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn checks(health: &AggregatedHealth, with_history: bool) -> BTreeMap<String, CheckBody> {
    health
        .checks
        .iter()
        .map(|check| {
            let body = CheckBody {
                status: check.status,
                message: check.result.message.clone(),
                duration: millis(check.result.duration),
                details: check.result.details.clone(),
                kind: check.kind,
                critical: check.critical,
                circuit: check.breaker.state,
                timestamp: check.result.timestamp,
                history: with_history.then(|| check.breaker.history.clone()),
            };
            (check.name.clone(), body)
        })
        .collect()
}

fn dependency_metrics(check: &CheckOutcome) -> DependencyMetrics {
    let b = &check.breaker;
    DependencyMetrics {
        kind: check.kind,
        critical: check.critical,
        circuit: b.state,
        consecutive_failures: b.consecutive_failures,
        total_probes: b.total_successes + b.total_failures,
        successes: b.total_successes,
        failures: b.total_failures,
        short_circuits: b.short_circuits,
        success_ratio: b.success_ratio,
        average_latency_ms: b.average_latency_ms,
        retry_in_ms: b.retry_in.map(|d| d.as_millis() as u64),
    }
}
