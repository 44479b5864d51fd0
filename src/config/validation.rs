//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds > 0, addresses parse)
//! - Check that database probes reference a known handle
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{ServiceConfig, PRIMARY_DATABASE_HANDLE};
use crate::health::probe::ProbeKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("dependency name must not be empty")]
    EmptyName,

    #[error("dependency '{dependency}': timeout must be greater than zero")]
    ZeroTimeout { dependency: String },

    #[error("{scope}: {field} must be greater than zero")]
    ZeroThreshold { scope: String, field: &'static str },

    #[error("dependency '{dependency}': invalid target: {reason}")]
    InvalidTarget { dependency: String, reason: String },

    #[error("dependency '{dependency}': invalid header '{header}': {reason}")]
    InvalidHeader { dependency: String, header: String, reason: String },

    #[error("dependency '{dependency}': invalid expected status range {min}-{max}")]
    InvalidStatusRange { dependency: String, min: u16, max: u16 },

    #[error("dependency '{dependency}': unknown database handle '{handle}'")]
    UnknownDatabaseHandle { dependency: String, handle: String },

    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("database url must not be empty")]
    EmptyDatabaseUrl,

    #[error("readiness.require_database is set but no database is configured")]
    MissingDatabase,
}

/// Validate a fully-parsed configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let mut require_positive = |value: u64, scope: &str, field: &'static str| {
        if value == 0 {
            errors.push(ValidationError::ZeroThreshold {
                scope: scope.to_string(),
                field,
            });
        }
    };
    require_positive(config.breaker.failure_threshold.into(), "breaker", "failure_threshold");
    require_positive(config.breaker.success_threshold.into(), "breaker", "success_threshold");
    require_positive(config.breaker.recovery_timeout_secs, "breaker", "recovery_timeout_secs");
    require_positive(config.readiness.window_size as u64, "readiness", "window_size");
    require_positive(config.timeouts.request_secs, "timeouts", "request_secs");
    if config.monitor.enabled {
        require_positive(config.monitor.interval_secs, "monitor", "interval_secs");
    }

    if config.readiness.require_database && config.database.is_none() {
        errors.push(ValidationError::MissingDatabase);
    }

    if let Some(db) = &config.database {
        if db.url.trim().is_empty() {
            errors.push(ValidationError::EmptyDatabaseUrl);
        }
        if let Err(mut e) = db.descriptor().validate() {
            errors.append(&mut e);
        }
    }

    for dependency in &config.dependencies {
        let descriptor = dependency.descriptor();
        if let Err(mut e) = descriptor.validate() {
            errors.append(&mut e);
        }
        if let ProbeKind::DatabasePing { handle } = &descriptor.kind {
            let known = config.database.is_some() && handle == PRIMARY_DATABASE_HANDLE;
            if !known {
                errors.push(ValidationError::UnknownDatabaseHandle {
                    dependency: descriptor.name.clone(),
                    handle: handle.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
