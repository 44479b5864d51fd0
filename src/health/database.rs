//! Database liveness capability.
//!
//! Every supported backend implements [`LivenessCheck`]; the executor only
//! sees the trait object, so adding a backend never touches probe code.

use async_trait::async_trait;
use std::fmt;

/// Error surfaced by a failed ping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PingError(pub String);

/// A database handle that can answer "are you alive?" cheaply.
#[async_trait]
pub trait LivenessCheck: Send + Sync + fmt::Debug {
    /// Backend name shown in probe details (e.g., "postgres").
    fn backend(&self) -> &'static str;

    /// Issue the driver's lightweight liveness command.
    async fn ping(&self) -> Result<(), PingError>;
}

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use sqlx::postgres::{PgPool, PgPoolOptions};
    use std::time::Duration;

    #[async_trait]
    impl LivenessCheck for PgPool {
        fn backend(&self) -> &'static str {
            "postgres"
        }

        async fn ping(&self) -> Result<(), PingError> {
            sqlx::query("SELECT 1")
                .execute(self)
                .await
                .map(|_| ())
                .map_err(|e| PingError(e.to_string()))
        }
    }

    /// Build a lazily-connecting pool so an unreachable database does not
    /// prevent the service from starting (it is reported, not fatal).
    pub fn connect_lazy(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
    }
}

#[cfg(feature = "postgres")]
pub use postgres::connect_lazy;
