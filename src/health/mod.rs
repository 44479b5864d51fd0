//! Dependency health subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP probe request (or monitor.rs tick)
//!     → orchestrator.rs (evaluate(mode))
//!     → registry.rs (dependencies in registration order)
//!     → resilience::circuit_breaker (admit, short-circuit or trial)
//!     → executor.rs (HTTP / TCP / database.rs ping, bounded by timeout)
//!     → window.rs (rolling outcomes per dependency)
//!     → state.rs (derive healthy / degraded / unhealthy)
//!     → report.rs (basic, readiness, deep and metrics bodies)
//! ```
//!
//! # Design Decisions
//! - The orchestrator is constructed once and injected; there is no global instance
//! - Probe failures are values, never errors
//! - Liveness never touches a dependency

pub mod database;
pub mod diagnostics;
pub mod executor;
pub mod monitor;
pub mod orchestrator;
pub mod probe;
pub mod registry;
pub mod report;
pub mod state;
pub mod window;

pub use executor::{CheckExecutor, Probe};
pub use orchestrator::{AggregatedHealth, EvaluationMode, HealthOrchestrator, ServiceMetadata};
pub use probe::{DependencyDescriptor, ProbeKind, ProbeResult};
pub use registry::DependencyRegistry;
pub use report::{ReadyPolicy, Reporter};
pub use state::{CheckStatus, HealthStatus};
