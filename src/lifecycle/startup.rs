//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the check executor (HTTP client, database pool)
//! - Register the built-in database and configured dependencies
//! - Construct the orchestrator and bind the listener
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::schema::PRIMARY_DATABASE_HANDLE;
use crate::config::{ConfigError, DatabaseConfig, ServiceConfig, ValidationError};
use crate::health::database::LivenessCheck;
use crate::health::executor::{CheckExecutor, Probe};
use crate::health::orchestrator::{HealthOrchestrator, ServiceMetadata};
use crate::health::registry::DependencyRegistry;
use crate::resilience::clock::{system_clock, SharedClock};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid dependency: {}", join(.0))]
    Registration(Vec<ValidationError>),

    #[error("database setup failed: {0}")]
    Database(String),

    #[error("http client setup failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn service_metadata(config: &ServiceConfig) -> ServiceMetadata {
    let version = config
        .service
        .version
        .clone()
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    ServiceMetadata::new(&config.service.name, version, &config.service.environment)
}

/// Executor with the service's database pool attached, if one is configured.
pub fn build_executor(config: &ServiceConfig) -> Result<CheckExecutor, StartupError> {
    let mut executor = CheckExecutor::new(CheckExecutor::default_client()?);
    if let Some(database) = &config.database {
        executor = executor.with_database(PRIMARY_DATABASE_HANDLE, connect_database(database)?);
    }
    Ok(executor)
}

#[cfg(feature = "postgres")]
fn connect_database(config: &DatabaseConfig) -> Result<Arc<dyn LivenessCheck>, StartupError> {
    let pool = crate::health::database::connect_lazy(
        &config.url,
        config.max_connections,
        std::time::Duration::from_millis(config.timeout_ms),
    )
    .map_err(|e| StartupError::Database(e.to_string()))?;
    Ok(Arc::new(pool))
}

#[cfg(not(feature = "postgres"))]
fn connect_database(_config: &DatabaseConfig) -> Result<Arc<dyn LivenessCheck>, StartupError> {
    Err(StartupError::Database(
        "built without the `postgres` feature".to_string(),
    ))
}

/// Registry holding the built-in database first, then peers in config order.
pub fn build_registry(config: &ServiceConfig, clock: SharedClock) -> Result<DependencyRegistry, StartupError> {
    let mut registry = DependencyRegistry::new(config.breaker_settings(), clock);

    match &config.database {
        Some(database) => registry
            .register(database.descriptor())
            .map_err(StartupError::Registration)?,
        None if config.readiness.require_database => {
            return Err(StartupError::Registration(vec![ValidationError::MissingDatabase]))
        }
        None => tracing::warn!("No database configured, built-in database check not registered"),
    }

    for dependency in &config.dependencies {
        registry
            .register(dependency.descriptor())
            .map_err(StartupError::Registration)?;
    }

    tracing::info!(dependencies = registry.len(), "Dependency registry ready");
    Ok(registry)
}

pub fn build_orchestrator(config: &ServiceConfig) -> Result<Arc<HealthOrchestrator>, StartupError> {
    let executor = build_executor(config)?;
    build_orchestrator_with(config, Arc::new(executor), system_clock())
}

/// Orchestrator over an arbitrary probe and clock.
pub fn build_orchestrator_with(
    config: &ServiceConfig,
    probe: Arc<dyn Probe>,
    clock: SharedClock,
) -> Result<Arc<HealthOrchestrator>, StartupError> {
    let registry = build_registry(config, clock)?;
    Ok(Arc::new(HealthOrchestrator::new(
        Arc::new(registry),
        probe,
        service_metadata(config),
    )))
}

pub async fn bind(config: &ServiceConfig) -> Result<TcpListener, StartupError> {
    let address = config.listener.bind_address.clone();
    TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })
}
