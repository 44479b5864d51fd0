//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → lifecycle::startup builds the dependency registry from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the registry is frozen after startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Any configuration error is fatal before the service accepts traffic

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BreakerConfig, DatabaseConfig, DependencyConfig, ListenerConfig, LogFormat, MonitorConfig,
    ObservabilityConfig, ProbeKindConfig, ReadinessConfig, ServiceConfig,
};
pub use validation::ValidationError;
