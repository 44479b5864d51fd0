//! HTTP boundary for the health endpoints.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router)
//!     → request.rs (assign / propagate x-request-id, request span)
//!     → handler (orchestrator.evaluate(mode))
//!     → health::report (JSON body + status code)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
