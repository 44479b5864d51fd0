//! depwatch: dependency health monitoring service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Prober (scheduler / load balancer / operator)
//!         │
//!         ▼
//!     ┌─────────┐    ┌──────────────┐    ┌──────────┐    ┌──────────────┐
//!     │  http   │───▶│ orchestrator │───▶│ registry │───▶│   breaker    │
//!     │ server  │    │ evaluate()   │    │          │    │ per dep      │
//!     └────▲────┘    └──────┬───────┘    └──────────┘    └──────┬───────┘
//!          │                │                                   │
//!          │                ▼                                   ▼
//!     ┌────┴────┐    ┌──────────────┐                    ┌──────────────┐
//!     │ report  │◀───│  aggregate   │◀───────────────────│   executor   │──▶ HTTP / TCP / DB
//!     └─────────┘    └──────────────┘                    └──────────────┘
//!
//!     Cross-cutting: config, observability (tracing, metrics), lifecycle
//! ```

use clap::Parser;
use std::path::PathBuf;

use depwatch::config::{self, loader};
use depwatch::health::monitor::HealthMonitor;
use depwatch::http::HttpServer;
use depwatch::lifecycle::{signals, startup, Shutdown};
use depwatch::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "depwatch", version, about = "Dependency health monitoring service")]
struct Args {
    /// Path to the TOML configuration file. Defaults and environment only when omitted.
    #[arg(short, long, env = "DEPWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::load_config(path),
        None => loader::load_from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("depwatch: {}", e);
            if let config::ConfigError::Validation(errors) = &e {
                for error in errors {
                    eprintln!("  - {}", error);
                }
            }
            return Err(e.into());
        }
    };

    if args.validate {
        println!(
            "configuration valid: {} dependencies{}",
            config.dependencies.len(),
            if config.database.is_some() { " + database" } else { "" }
        );
        return Ok(());
    }

    logging::init_logging(&config.observability);
    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        version = env!("CARGO_PKG_VERSION"),
        "depwatch starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let orchestrator = startup::build_orchestrator(&config)?;
    let listener = startup::bind(&config).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        dependencies = orchestrator.registry().len(),
        ready_on_degraded = config.readiness.ready_on_degraded,
        "Listening for health probes"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(&shutdown);

    let monitor = HealthMonitor::new(orchestrator.clone(), config.monitor.clone());
    let monitor_handle = tokio::spawn(monitor.run(shutdown.subscribe()));

    let server = HttpServer::new(&config, orchestrator);
    server.run(listener, shutdown.subscribe()).await?;

    let _ = monitor_handle.await;
    tracing::info!("Shutdown complete");
    Ok(())
}
