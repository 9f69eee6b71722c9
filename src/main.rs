use axum::http::HeaderName;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::TollgateConfig;
use tollgate::http::{probe, AdmissionState, HttpServer, IdentitySource, ProbeResult};
use tollgate::ratelimit::{build_limiter, spawn_sweeper, Algorithm, SystemClock};

/// Per-client HTTP request admission with fixed-window and sliding-window limits.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (the default)
    Serve(ServeArgs),
    /// Send a series of requests to a running server and report each verdict
    Probe(ProbeArgs),
}

#[derive(Debug, Default, Args)]
struct ServeArgs {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the rate limiting algorithm
    #[arg(long, value_enum)]
    algorithm: Option<Algorithm>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Args)]
struct ProbeArgs {
    /// Target URL
    #[arg(long, default_value = "http://localhost:3000/")]
    url: String,

    /// Number of requests to send
    #[arg(short = 'n', long, default_value_t = 7)]
    count: usize,

    /// Pause between requests in milliseconds
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(args).await,
        Command::Probe(args) => run_probe(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    info!("Starting Tollgate admission service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TollgateConfig::load(args.config.as_deref())?;
    if let Some(algorithm) = args.algorithm {
        config.rate_limiting.algorithm = algorithm;
    }
    if let Some(port) = args.port {
        config.server.listen_addr.set_port(port);
    }
    info!(
        listen_addr = %config.server.listen_addr,
        algorithm = %config.rate_limiting.algorithm,
        "Configuration loaded"
    );

    let limiter = build_limiter(
        config.rate_limiting.algorithm,
        config.rate_limiting.limit(),
        config.rate_limiting.idle_ttl(),
    )?;
    let clock = Arc::new(SystemClock::new());

    let identity = match &config.server.identity_header {
        Some(name) => IdentitySource::Header(HeaderName::try_from(name.as_str())?),
        None => IdentitySource::PeerAddr,
    };
    let state = AdmissionState::new(limiter.clone(), clock.clone()).with_identity(identity);

    let sweeper = spawn_sweeper(limiter, clock, config.rate_limiting.sweep_interval());

    // Run the server with graceful shutdown on Ctrl+C
    HttpServer::new(config.server.listen_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    sweeper.stop();
    info!("Tollgate admission service stopped");
    Ok(())
}

async fn run_probe(args: ProbeArgs) -> anyhow::Result<()> {
    println!("Sending {} requests to {}", args.count, args.url);

    let outcomes = probe(&args.url, args.count, Duration::from_millis(args.delay_ms)).await?;
    for outcome in &outcomes {
        let elapsed = outcome.elapsed.as_millis();
        match &outcome.result {
            ProbeResult::Allowed { status, body } => {
                println!("Request {}: ALLOWED ({}) - {} [{}ms]", outcome.index, status, body, elapsed)
            }
            ProbeResult::Blocked { status, body, .. } => {
                println!("Request {}: BLOCKED ({}) - {} [{}ms]", outcome.index, status, body, elapsed)
            }
            ProbeResult::Failed(error) => {
                println!("Request {}: FAILED - {}", outcome.index, error)
            }
        }
    }

    let blocked = outcomes
        .iter()
        .filter(|o| matches!(o.result, ProbeResult::Blocked { .. }))
        .count();
    println!("{} of {} requests blocked", blocked, outcomes.len());
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
