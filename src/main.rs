//! moose: a static file server.
//!
//! This is the application entry point. It parses flags, loads configuration,
//! initializes tracing, provisions the TLS identity and runs the HTTP and HTTPS
//! listeners until SIGINT/SIGTERM.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moose::cli::Args;
use moose::config::{LogFormat, DEFAULT_LOG_FILTER};
use moose::http::{setup_shutdown_handler, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let log_level = args.log_level.clone();
    let config = args.into_config()?;

    // Initialize tracing with priority: CLI > env > default
    let log_filter = log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    match config.logging.format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    let server = Server::new(config)?;
    let running = server.start()?;
    setup_shutdown_handler(running.shutdown_handle());

    running.wait().await?;
    tracing::info!("Done - exiting");

    Ok(())
}
