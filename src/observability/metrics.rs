//! Metrics collection and exposition.
//!
//! # Metrics
//! - `depwatch_probes_total` (counter): real probes by dependency, kind, outcome
//! - `depwatch_probe_duration_seconds` (histogram): probe latency by dependency
//! - `depwatch_short_circuits_total` (counter): probes skipped by an open breaker
//! - `depwatch_circuit_state` (gauge): 0=closed, 1=half_open, 2=open
//! - `depwatch_evaluations_total` (counter): evaluations by mode and resulting status

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder with an HTTP listener on `addr`.
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn describe_metrics() {
    describe_counter!("depwatch_probes_total", "Dependency probes executed");
    describe_histogram!(
        "depwatch_probe_duration_seconds",
        "Dependency probe latency in seconds"
    );
    describe_counter!(
        "depwatch_short_circuits_total",
        "Probes answered by an open circuit without contacting the dependency"
    );
    describe_gauge!(
        "depwatch_circuit_state",
        "Circuit breaker state (0=closed, 1=half_open, 2=open)"
    );
    describe_counter!("depwatch_evaluations_total", "Health evaluations by mode and status");
}

pub fn record_probe(dependency: &str, kind: &'static str, success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        "depwatch_probes_total",
        "dependency" => dependency.to_string(),
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
    histogram!("depwatch_probe_duration_seconds", "dependency" => dependency.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_short_circuit(dependency: &str) {
    counter!("depwatch_short_circuits_total", "dependency" => dependency.to_string()).increment(1);
}

pub fn set_circuit_state(dependency: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("depwatch_circuit_state", "dependency" => dependency.to_string()).set(value);
}

pub fn record_evaluation(mode: &'static str, status: &'static str) {
    counter!("depwatch_evaluations_total", "mode" => mode, "status" => status).increment(1);
}
