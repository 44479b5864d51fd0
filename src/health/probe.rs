//! Dependency descriptors and probe outcomes.
//!
//! A [`DependencyDescriptor`] is the immutable description of one monitored
//! dependency; a [`ProbeResult`] is what a single probe against it produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::config::validation::ValidationError;

/// Message carried by synthesized results while a breaker is open.
pub const CIRCUIT_OPEN_MESSAGE: &str = "circuit open";

/// HTTP method used by HTTP probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
}

impl HttpMethod {
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

/// Inclusive range of HTTP status codes counted as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

impl StatusRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, status: u16) -> bool {
        (self.min..=self.max).contains(&status)
    }
}

impl Default for StatusRange {
    fn default() -> Self {
        Self::new(200, 299)
    }
}

impl fmt::Display for StatusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// How a dependency is probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    Http {
        url: String,
        method: HttpMethod,
        expected: StatusRange,
        headers: Vec<(String, String)>,
    },
    Tcp {
        address: String,
    },
    DatabasePing {
        /// Name of the database handle registered with the executor.
        handle: String,
    },
}

impl ProbeKind {
    /// Short label used in logs, metrics and response bodies.
    pub fn label(&self) -> &'static str {
        match self {
            ProbeKind::Http { .. } => "http",
            ProbeKind::Tcp { .. } => "tcp",
            ProbeKind::DatabasePing { .. } => "database_ping",
        }
    }

    pub fn target(&self) -> &str {
        match self {
            ProbeKind::Http { url, .. } => url,
            ProbeKind::Tcp { address } => address,
            ProbeKind::DatabasePing { handle } => handle,
        }
    }
}

/// Optional per-dependency breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BreakerOverrides {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout: Option<Duration>,
}

/// Static configuration for one monitored dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDescriptor {
    /// Unique key within a registry.
    pub name: String,
    pub kind: ProbeKind,
    /// Upper bound for a single probe. Must be non-zero.
    pub timeout: Duration,
    /// Critical dependencies make the service non-ready when failing.
    pub critical: bool,
    pub breaker: BreakerOverrides,
}

impl DependencyDescriptor {
    pub fn new(name: impl Into<String>, kind: ProbeKind, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            kind,
            timeout,
            critical: true,
            breaker: BreakerOverrides::default(),
        }
    }

    pub fn http(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        Self::new(
            name,
            ProbeKind::Http {
                url: url.into(),
                method: HttpMethod::Get,
                expected: StatusRange::default(),
                headers: Vec::new(),
            },
            timeout,
        )
    }

    pub fn tcp(name: impl Into<String>, address: impl Into<String>, timeout: Duration) -> Self {
        Self::new(name, ProbeKind::Tcp { address: address.into() }, timeout)
    }

    pub fn database(name: impl Into<String>, handle: impl Into<String>, timeout: Duration) -> Self {
        Self::new(name, ProbeKind::DatabasePing { handle: handle.into() }, timeout)
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_breaker(mut self, overrides: BreakerOverrides) -> Self {
        self.breaker = overrides;
        self
    }

    /// Semantic checks applied at registration time.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName);
        }
        if self.timeout.is_zero() {
            errors.push(ValidationError::ZeroTimeout { dependency: self.name.clone() });
        }
        if self.breaker.failure_threshold == Some(0) {
            errors.push(ValidationError::ZeroThreshold {
                scope: self.name.clone(),
                field: "failure_threshold",
            });
        }
        if self.breaker.recovery_timeout.is_some_and(|t| t.is_zero()) {
            errors.push(ValidationError::ZeroThreshold {
                scope: self.name.clone(),
                field: "recovery_timeout_secs",
            });
        }

        match &self.kind {
            ProbeKind::Http { url, expected, headers, .. } => {
                match url::Url::parse(url) {
                    Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                    Ok(parsed) => errors.push(ValidationError::InvalidTarget {
                        dependency: self.name.clone(),
                        reason: format!("unsupported scheme '{}'", parsed.scheme()),
                    }),
                    Err(e) => errors.push(ValidationError::InvalidTarget {
                        dependency: self.name.clone(),
                        reason: e.to_string(),
                    }),
                }
                for (name, value) in headers {
                    let reason = match reqwest::header::HeaderName::from_bytes(name.as_bytes()) {
                        Err(e) => Some(e.to_string()),
                        Ok(_) => reqwest::header::HeaderValue::from_str(value).err().map(|e| e.to_string()),
                    };
                    if let Some(reason) = reason {
                        errors.push(ValidationError::InvalidHeader {
                            dependency: self.name.clone(),
                            header: name.clone(),
                            reason,
                        });
                    }
                }
                if expected.min > expected.max || expected.min < 100 || expected.max > 599 {
                    errors.push(ValidationError::InvalidStatusRange {
                        dependency: self.name.clone(),
                        min: expected.min,
                        max: expected.max,
                    });
                }
            }
            ProbeKind::Tcp { address } => {
                let valid = address
                    .rsplit_once(':')
                    .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
                if !valid {
                    errors.push(ValidationError::InvalidTarget {
                        dependency: self.name.clone(),
                        reason: format!("'{}' is not host:port", address),
                    });
                }
            }
            ProbeKind::DatabasePing { handle } => {
                if handle.trim().is_empty() {
                    errors.push(ValidationError::InvalidTarget {
                        dependency: self.name.clone(),
                        reason: "database handle name is empty".to_string(),
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
}

/// Outcome of one probe invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub success: bool,
    pub message: String,
    pub duration: Duration,
    /// Protocol-specific detail (observed status, transport error, ...).
    pub details: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    pub fn success(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: true,
            message: message.into(),
            duration,
            details: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            message: message.into(),
            duration,
            details: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Synthesized result returned instead of probing while the breaker is open.
    pub fn circuit_open() -> Self {
        Self::failure(CIRCUIT_OPEN_MESSAGE, Duration::ZERO).with_detail("circuit", "open")
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is_short_circuit(&self) -> bool {
        !self.success && self.duration.is_zero() && self.message == CIRCUIT_OPEN_MESSAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_range_bounds_are_inclusive() {
        let range = StatusRange::default();
        assert!(range.contains(200));
        assert!(range.contains(299));
        assert!(!range.contains(199));
        assert!(!range.contains(300));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let descriptor = DependencyDescriptor::tcp("cache", "127.0.0.1:6379", Duration::ZERO);
        let errors = descriptor.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::ZeroTimeout { dependency: "cache".into() }]
        );
    }

    #[test]
    fn test_bad_targets_rejected() {
        let http = DependencyDescriptor::http("peer", "ftp://peer/health", Duration::from_secs(1));
        assert!(http.validate().is_err());

        let tcp = DependencyDescriptor::tcp("cache", "localhost", Duration::from_secs(1));
        assert!(tcp.validate().is_err());

        let ok = DependencyDescriptor::http("peer", "http://peer:8080/health", Duration::from_secs(1));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let with_headers = |headers: Vec<(&str, &str)>| {
            let mut descriptor =
                DependencyDescriptor::http("peer", "http://peer/health", Duration::from_secs(1));
            if let ProbeKind::Http { headers: h, .. } = &mut descriptor.kind {
                *h = headers.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            }
            descriptor
        };

        let errors = with_headers(vec![("bad header", "x"), ("x-token", "line\nbreak")])
            .validate()
            .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], ValidationError::InvalidHeader { header, .. } if header == "bad header"));
        assert!(matches!(&errors[1], ValidationError::InvalidHeader { header, .. } if header == "x-token"));

        assert!(with_headers(vec![("x-api-key", "secret")]).validate().is_ok());
    }

    #[test]
    fn test_inverted_status_range_rejected() {
        let mut descriptor =
            DependencyDescriptor::http("peer", "http://peer/health", Duration::from_secs(1));
        if let ProbeKind::Http { expected, .. } = &mut descriptor.kind {
            *expected = StatusRange::new(400, 200);
        }
        let errors = descriptor.validate().unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidStatusRange { .. }));
    }

    #[test]
    fn test_circuit_open_result_shape() {
        let result = ProbeResult::circuit_open();
        assert!(!result.success);
        assert_eq!(result.message, "circuit open");
        assert_eq!(result.duration, Duration::ZERO);
        assert!(result.is_short_circuit());
    }
}
