use clap::{Parser, Subcommand};
use serde_json::Value;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "depwatch-cli")]
#[command(about = "Query the health endpoints of a depwatch-enabled service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "DEPWATCH_URL")]
    url: String,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Basic health (/health)
    Basic,
    /// Liveness (/health/live)
    Live,
    /// Readiness (/health/ready); exits non-zero when not ready
    Ready,
    /// Deep diagnostics (/health/deep)
    Deep,
    /// Per-dependency metrics (/health/metrics)
    Metrics,
}

impl Commands {
    fn path(&self) -> &'static str {
        match self {
            Commands::Basic => "/health",
            Commands::Live => "/health/live",
            Commands::Ready => "/health/ready",
            Commands::Deep => "/health/deep",
            Commands::Metrics => "/health/metrics",
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout))
        .build()?;

    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.path());
    let res = client.get(&url).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let status = res.status();
    let request_id = res
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }

    if !status.is_success() {
        eprintln!(
            "Error: service returned status {} (request id {})",
            status,
            request_id.as_deref().unwrap_or("unknown")
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
