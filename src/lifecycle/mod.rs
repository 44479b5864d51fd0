//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Executor (HTTP client, database pool)
//!     → Registry (built-in database, then configured dependencies)
//!     → Orchestrator → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast → Monitor stops, server drains → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: an invalid dependency or unusable database URL is fatal
//! - The registry is frozen before the listener accepts traffic

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_orchestrator, StartupError};
