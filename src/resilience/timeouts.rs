//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every dependency call with its own deadline
//! - Turn an elapsed deadline into a distinct error value
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The bound is applied by the callee, never left to the caller

use std::future::Future;
use std::time::Duration;

/// Error produced when a bounded operation does not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("timed out after {0:?}")]
pub struct Elapsed(pub Duration);

/// Run `fut` for at most `limit`.
pub async fn bounded<F, T>(limit: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Elapsed(limit))
}
