use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::{LogFormat, LoggingConfig, TurnstileConfig};
use turnstile::http::{Dispatcher, HttpServer, RecordStore};
use turnstile::ratelimit::PolicyRegistry;

/// Rate limited record service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Validate configuration and policies, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = TurnstileConfig::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }

    init_tracing(&config.logging);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &cli.config {
        info!(path = %path.display(), "Loaded configuration file");
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    // Any policy or route error here stops the service before it binds.
    let policies = config.policies()?;
    let registry = PolicyRegistry::from_config(&policies)?;
    let store = Arc::new(RecordStore::with_sample_data());
    let dispatcher = Dispatcher::new(store, &registry, &config.routes)?;

    if cli.check {
        info!(policies = registry.len(), "Configuration is valid");
        return Ok(());
    }

    let server = HttpServer::new(config.server.listen_addr, &dispatcher);
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Turnstile stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
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
