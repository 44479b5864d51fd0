//! Background readiness evaluation.
//!
//! # Responsibilities
//! - Periodically run a READINESS evaluation
//! - Keep breaker state and rolling windows fresh between external probes

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::MonitorConfig;
use crate::health::orchestrator::{EvaluationMode, HealthOrchestrator};
use crate::health::state::HealthStatus;

pub struct HealthMonitor {
    orchestrator: Arc<HealthOrchestrator>,
    config: MonitorConfig,
}

impl HealthMonitor {
    pub fn new(orchestrator: Arc<HealthOrchestrator>, config: MonitorConfig) -> Self {
        Self { orchestrator, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Background health monitor disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            dependencies = self.orchestrator.registry().len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut last = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let health = self.orchestrator.evaluate(EvaluationMode::Readiness).await;
                    if last != Some(health.status) {
                        log_change(last, health.status);
                        last = Some(health.status);
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

fn log_change(previous: Option<HealthStatus>, current: HealthStatus) {
    let previous = previous.map(HealthStatus::as_str).unwrap_or("unknown");
    match current {
        HealthStatus::Healthy => tracing::info!(previous, %current, "Service health changed"),
        _ => tracing::warn!(previous, %current, "Service health changed"),
    }
}
