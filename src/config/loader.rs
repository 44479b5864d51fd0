//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{DatabaseConfig, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {key}")]
    Env { key: String, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

const ENV_PREFIX: &str = "DEPWATCH_";

/// Load, apply environment overrides and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    apply_overrides(&mut config, std::env::vars())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Build configuration from defaults and environment only (no file).
pub fn load_from_env() -> Result<ServiceConfig, ConfigError> {
    let mut config = ServiceConfig::default();
    apply_overrides(&mut config, std::env::vars())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<ServiceConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply environment-style overrides.
///
/// | Key | Effect |
/// |---|---|
/// | `DEPWATCH_BIND_ADDRESS` | listener bind address |
/// | `DEPWATCH_ENVIRONMENT` | reported environment |
/// | `DEPWATCH_FAILURE_THRESHOLD` | failures before a breaker opens |
/// | `DEPWATCH_SUCCESS_THRESHOLD` | half-open successes before it closes |
/// | `DEPWATCH_RECOVERY_TIMEOUT_SECS` | open duration before a trial probe |
/// | `DEPWATCH_READY_ON_DEGRADED` | readiness verdict while degraded |
/// | `DEPWATCH_REQUIRE_DATABASE` | fail startup without a database |
/// | `DATABASE_URL` | the service's own database |
/// | `DEPWATCH_DEP_<NAME>_TIMEOUT_MS` | per-dependency timeout |
/// | `DEPWATCH_DEP_<NAME>_CRITICAL` | per-dependency criticality |
pub fn apply_overrides<I>(config: &mut ServiceConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        match key.as_str() {
            "DATABASE_URL" => match config.database.as_mut() {
                Some(db) => db.url = value,
                None => config.database = Some(DatabaseConfig::new(value)),
            },
            "DEPWATCH_BIND_ADDRESS" => config.listener.bind_address = value,
            "DEPWATCH_ENVIRONMENT" => config.service.environment = value,
            "DEPWATCH_FAILURE_THRESHOLD" => {
                config.breaker.failure_threshold = parse_value(&key, &value)?
            }
            "DEPWATCH_SUCCESS_THRESHOLD" => {
                config.breaker.success_threshold = parse_value(&key, &value)?
            }
            "DEPWATCH_RECOVERY_TIMEOUT_SECS" => {
                config.breaker.recovery_timeout_secs = parse_value(&key, &value)?
            }
            "DEPWATCH_READY_ON_DEGRADED" => {
                config.readiness.ready_on_degraded = parse_bool(&key, &value)?
            }
            "DEPWATCH_REQUIRE_DATABASE" => {
                config.readiness.require_database = parse_bool(&key, &value)?
            }
            _ => apply_dependency_override(config, &key, &value)?,
        }
    }
    Ok(())
}

fn apply_dependency_override(
    config: &mut ServiceConfig,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    let Some(rest) = key.strip_prefix(ENV_PREFIX).and_then(|k| k.strip_prefix("DEP_")) else {
        return Ok(());
    };

    let (env_name, field) = if let Some(name) = rest.strip_suffix("_TIMEOUT_MS") {
        (name, "timeout_ms")
    } else if let Some(name) = rest.strip_suffix("_CRITICAL") {
        (name, "critical")
    } else {
        return Ok(());
    };

    if env_name == env_key(crate::config::schema::BUILTIN_DATABASE) {
        if let Some(db) = config.database.as_mut() {
            match field {
                "timeout_ms" => db.timeout_ms = parse_value(key, value)?,
                _ => db.critical = parse_bool(key, value)?,
            }
            return Ok(());
        }
    }

    let Some(dependency) = config
        .dependencies
        .iter_mut()
        .find(|d| env_key(&d.name) == env_name)
    else {
        tracing::warn!(key, "Override for unknown dependency ignored");
        return Ok(());
    };

    match field {
        "timeout_ms" => dependency.timeout_ms = parse_value(key, value)?,
        _ => dependency.critical = parse_bool(key, value)?,
    }
    Ok(())
}

/// Dependency name as it appears in environment keys.
pub fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
