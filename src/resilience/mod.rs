//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Probe of a dependency:
//!     → circuit_breaker.rs (admit, short-circuit, or single half-open trial)
//!     → timeouts.rs (enforce the dependency's deadline)
//!     → circuit_breaker.rs (record outcome, transition under the lock)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Breakers read time through clock.rs so recovery is testable without sleeping
//! - Transitions happen under one write lock; the lock is never held across a probe

pub mod circuit_breaker;
pub mod clock;
pub mod timeouts;
