//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the health handlers
//! - Wire up middleware (request ID, tracing, timeout, no-store caching)
//! - Map evaluation results to status codes
//! - Serve until the shutdown broadcast fires
//!
//! # Endpoints
//! - `/health`, `/health/live`: liveness, always 200 while the process is up
//! - `/health/ready`: readiness, 200 or 503 per the ready policy
//! - `/health/deep`: readiness plus diagnostics, always 200
//! - `/health/metrics`: per-dependency counters, always 200. Reads breaker
//!   snapshots only; a scrape never probes a dependency
//!
//! GET routes answer HEAD with the same status and no body.

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{set_header::SetResponseHeaderLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServiceConfig;
use crate::health::orchestrator::{EvaluationMode, HealthOrchestrator};
use crate::health::report::{ReadyPolicy, Reporter};
use crate::http::request;

/// Headroom between the evaluation deadline and the request timeout.
const EVALUATION_SLACK: Duration = Duration::from_secs(1);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<HealthOrchestrator>,
    pub reporter: Reporter,
}

/// HTTP server exposing the health endpoints.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &ServiceConfig, orchestrator: Arc<HealthOrchestrator>) -> Self {
        let state = AppState {
            orchestrator,
            reporter: Reporter::new(ReadyPolicy::from(&config.readiness)),
        };
        let router = Self::build_router(Duration::from_secs(config.timeouts.request_secs), state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The request timeout is widened to cover the slowest evaluation, so a
    /// readiness answer is always a status code with a body, never a 408.
    #[allow(deprecated)]
    pub fn build_router(request_timeout: Duration, state: AppState) -> Router {
        let budget = state.orchestrator.evaluation_budget() + EVALUATION_SLACK;
        let request_timeout = if budget > request_timeout {
            tracing::info!(
                configured = ?request_timeout,
                effective = ?budget,
                "Request timeout raised to cover dependency timeouts"
            );
            budget
        } else {
            request_timeout
        };

        Router::new()
            .route("/health", get(live_handler))
            .route("/health/live", get(live_handler))
            .route("/health/ready", get(ready_handler))
            .route("/health/deep", get(deep_handler))
            .route("/health/metrics", get(metrics_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(request::set_request_id())
                    .layer(TraceLayer::new_for_http().make_span_with(request::make_span))
                    .layer(request::propagate_request_id())
                    .layer(SetResponseHeaderLayer::overriding(
                        header::CACHE_CONTROL,
                        HeaderValue::from_static("no-store"),
                    ))
                    .layer(TimeoutLayer::new(request_timeout)),
            )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn live_handler(State(state): State<AppState>) -> Response {
    let health = state.orchestrator.liveness();
    (StatusCode::OK, Json(state.reporter.basic(&health))).into_response()
}

async fn ready_handler(State(state): State<AppState>) -> Response {
    let health = state.orchestrator.evaluate(EvaluationMode::Readiness).await;
    let (ready, body) = state.reporter.readiness(&health);
    let status = if ready {
        StatusCode::OK
    } else {
        tracing::warn!(status = %health.status, "Readiness check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

async fn deep_handler(State(state): State<AppState>) -> Response {
    let health = state.orchestrator.evaluate(EvaluationMode::Deep).await;
    (StatusCode::OK, Json(state.reporter.deep(&health))).into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let health = state.orchestrator.observe().await;
    (StatusCode::OK, Json(state.reporter.metrics(&health))).into_response()
}
