//! Dependency health monitoring with per-dependency circuit breakers.

pub mod config;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ServiceConfig;
pub use health::{EvaluationMode, HealthOrchestrator, HealthStatus};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
