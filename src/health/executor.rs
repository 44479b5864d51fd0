//! Check executor: one bounded-time probe against one dependency.
//!
//! # Responsibilities
//! - Probe HTTP endpoints, TCP sockets and database handles
//! - Enforce each descriptor's timeout independently of the caller
//! - Convert every error into a failed [`ProbeResult`]
//!
//! # Design Decisions
//! - Never returns an error: timeouts and transport failures are data
//! - Stateless apart from the shared HTTP client and database handles
//! - Latency is measured with the real monotonic clock

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use crate::health::database::LivenessCheck;
use crate::health::probe::{DependencyDescriptor, HttpMethod, ProbeKind, ProbeResult, StatusRange};
use crate::observability::metrics;
use crate::resilience::timeouts::bounded;

/// Anything that can probe a dependency.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, descriptor: &DependencyDescriptor) -> ProbeResult;
}

/// Internal probe failure, always folded into a failed result.
#[derive(Debug, thiserror::Error)]
enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status} (expected {expected})")]
    UnexpectedStatus { status: u16, expected: StatusRange },

    #[error("ping failed: {0}")]
    Database(String),

    #[error("no database handle '{0}' registered")]
    UnknownHandle(String),
}

impl ProbeError {
    fn kind(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Connect(_) => "connect",
            ProbeError::Request(_) => "request",
            ProbeError::UnexpectedStatus { .. } => "unexpected_status",
            ProbeError::Database(_) => "database",
            ProbeError::UnknownHandle(_) => "unknown_handle",
        }
    }
}

/// Probe implementation for the supported protocols.
#[derive(Debug, Clone)]
pub struct CheckExecutor {
    client: reqwest::Client,
    databases: HashMap<String, Arc<dyn LivenessCheck>>,
}

impl CheckExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            databases: HashMap::new(),
        }
    }

    /// HTTP client suitable for probing: no redirects, no connection reuse
    /// across probes so a stale pooled socket never masks an outage.
    pub fn default_client() -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .user_agent(concat!("depwatch/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(0)
            .build()
    }

    /// Register a database handle under `handle`.
    pub fn with_database(mut self, handle: impl Into<String>, db: Arc<dyn LivenessCheck>) -> Self {
        self.databases.insert(handle.into(), db);
        self
    }

    pub fn has_database(&self, handle: &str) -> bool {
        self.databases.contains_key(handle)
    }

    async fn run(&self, descriptor: &DependencyDescriptor) -> Result<ProbeResult, ProbeError> {
        match &descriptor.kind {
            ProbeKind::Http {
                url,
                method,
                expected,
                headers,
            } => self.probe_http(url, *method, *expected, headers).await,
            ProbeKind::Tcp { address } => probe_tcp(address).await,
            ProbeKind::DatabasePing { handle } => self.probe_database(handle).await,
        }
    }

    async fn probe_http(
        &self,
        url: &str,
        method: HttpMethod,
        expected: StatusRange,
        headers: &[(String, String)],
    ) -> Result<ProbeResult, ProbeError> {
        let mut request = self.client.request(method.as_reqwest(), url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;
        let status = response.status().as_u16();

        if !expected.contains(status) {
            return Err(ProbeError::UnexpectedStatus { status, expected });
        }

        Ok(ProbeResult::success(format!("HTTP {}", status), Duration::ZERO)
            .with_detail("status", status)
            .with_detail("url", url))
    }

    async fn probe_database(&self, handle: &str) -> Result<ProbeResult, ProbeError> {
        let db = self
            .databases
            .get(handle)
            .ok_or_else(|| ProbeError::UnknownHandle(handle.to_string()))?;

        db.ping().await.map_err(|e| ProbeError::Database(e.0))?;

        Ok(ProbeResult::success("ping ok", Duration::ZERO)
            .with_detail("backend", db.backend())
            .with_detail("handle", handle))
    }
}

async fn probe_tcp(address: &str) -> Result<ProbeResult, ProbeError> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| ProbeError::Connect(e.to_string()))?;
    let peer = stream.peer_addr().map(|a| a.to_string()).ok();
    drop(stream);

    let mut result = ProbeResult::success("connected", Duration::ZERO).with_detail("address", address);
    if let Some(peer) = peer {
        result = result.with_detail("peer", peer);
    }
    Ok(result)
}

#[async_trait]
impl Probe for CheckExecutor {
    async fn probe(&self, descriptor: &DependencyDescriptor) -> ProbeResult {
        let started = Instant::now();
        let outcome = match bounded(descriptor.timeout, self.run(descriptor)).await {
            Ok(inner) => inner,
            Err(elapsed) => Err(ProbeError::Timeout(elapsed.0)),
        };
        let duration = started.elapsed();

        let result = match outcome {
            Ok(mut result) => {
                result.duration = duration;
                result
            }
            Err(e) => {
                tracing::debug!(
                    dependency = %descriptor.name,
                    kind = descriptor.kind.label(),
                    error = %e,
                    "Probe failed"
                );
                let mut result = ProbeResult::failure(e.to_string(), duration)
                    .with_detail("error", e.kind())
                    .with_detail("target", descriptor.kind.target());
                match &e {
                    ProbeError::UnexpectedStatus { status, expected } => {
                        result = result
                            .with_detail("status", *status)
                            .with_detail("expected", expected.to_string());
                    }
                    ProbeError::Timeout(limit) => {
                        result = result.with_detail("timeout_ms", json!(limit.as_millis() as u64));
                    }
                    _ => {}
                }
                result
            }
        };

        metrics::record_probe(
            &descriptor.name,
            descriptor.kind.label(),
            result.success,
            result.duration,
        );
        result
    }
}
