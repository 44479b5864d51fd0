//! Service health state derivation.
//!
//! # States
//! - Healthy: every dependency passes
//! - Degraded: all critical dependencies pass, some advisory one fails
//! - Unhealthy: at least one critical dependency fails
//!
//! # Design Decisions
//! - Derivation is a commutative fold (max severity), so dependency
//!   evaluation order never changes the verdict
//! - Anything that cannot be classified counts as a failing check

use serde::Serialize;
use std::fmt;

/// Overall service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single dependency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
}

impl CheckStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            CheckStatus::Healthy
        } else {
            CheckStatus::Unhealthy
        }
    }

    pub fn is_healthy(self) -> bool {
        self == CheckStatus::Healthy
    }
}

/// Contribution of one check to the overall status.
pub fn classify(critical: bool, status: CheckStatus) -> HealthStatus {
    match (status, critical) {
        (CheckStatus::Healthy, _) => HealthStatus::Healthy,
        (CheckStatus::Unhealthy, true) => HealthStatus::Unhealthy,
        (CheckStatus::Unhealthy, false) => HealthStatus::Degraded,
    }
}

/// Derive the overall status from `(critical, status)` pairs.
pub fn aggregate<I>(checks: I) -> HealthStatus
where
    I: IntoIterator<Item = (bool, CheckStatus)>,
{
    checks
        .into_iter()
        .map(|(critical, status)| classify(critical, status))
        .max()
        .unwrap_or(HealthStatus::Healthy)
}
