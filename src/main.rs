//! Main entry point for the Waiting Room matchmaking gateway
//!
//! Initializes configuration, logging, the AMQP-backed coordination layer,
//! and the WebSocket listener, then runs until a shutdown signal arrives.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};
use waiting_room::config::AppConfig;
use waiting_room::service::AppState;

/// Waiting Room - WebSocket matchmaking gateway
#[derive(Parser)]
#[command(
    name = "waiting-room",
    version,
    about = "WebSocket matchmaking gateway with AMQP cross-instance coordination",
    long_about = "Waiting Room accepts game clients over WebSocket with encrypted admission \
                 tickets, queues them per region/playlist/custom-key/season bucket, and assigns \
                 them to game servers with finite capacity. Instances coordinate matching over \
                 a shared AMQP queue."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Bind port override
    #[arg(short, long, value_name = "PORT", help = "Override gateway bind port")]
    port: Option<u16>,

    /// AMQP host override
    #[arg(long, value_name = "HOST", help = "Override AMQP broker host")]
    amqp_host: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
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
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Waiting Room Matchmaking Gateway");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   Listening: {}:{}",
        config.service.host, config.service.port
    );
    info!(
        "   AMQP: {}:{} queue '{}'",
        config.amqp.host, config.amqp.port, config.amqp.queue_name
    );
    info!(
        "   Freshness window: {}s",
        config.matchmaking.freshness_window_seconds
    );
    info!(
        "   Default-key fallback: {}",
        config.matchmaking.allow_default_key_fallback
    );
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(port) = args.port {
        config.service.port = port;
    }

    if let Some(amqp_host) = &args.amqp_host {
        config.amqp.host = amqp_host.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    let mut app_state = AppState::new(config.clone());

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Waiting Room is running, press Ctrl+C to shut down");
    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown");
    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("Graceful shutdown completed"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    info!("Waiting Room stopped");
    Ok(())
}
