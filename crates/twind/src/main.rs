//! Twind Server
//!
//! Digital-twin store with a REST API and change notifications.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use twin_core::{EventBus, Registry};

use twind::config::{LogFormat, LoggingConfig, TwindConfig};
use twind::events::spawn_event_logger;
use twind::server::{AppState, create_router};

/// Digital Twin Server
#[derive(Parser, Debug)]
#[command(name = "twind")]
#[command(about = "Digital Twin Server", long_about = None)]
struct Args {
    /// Path to a twind.toml config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host address
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Slots per subscriber queue
    #[arg(long)]
    queue_capacity: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TwindConfig::load(path).await?,
        None => TwindConfig::default(),
    };

    // Command line overrides the file
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(capacity) = args.queue_capacity {
        config.bus.queue_capacity = capacity;
    }
    config.validate()?;

    init_tracing(&config.logging);

    info!("Starting twind v{}", env!("CARGO_PKG_VERSION"));

    // Create core components
    let registry = Arc::new(Registry::new());
    let bus = Arc::new(EventBus::with_capacity(config.bus.queue_capacity));
    let loggers = spawn_event_logger(&bus);

    let state = AppState::new(registry, bus.clone());
    let app = create_router(state, config.server.request_timeout());

    // Start server
    let addr: SocketAddr = config.server.addr().parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Closing the bus ends every subscription, which stops the loggers
    bus.close();
    futures::future::join_all(loggers).await;

    info!("Server gracefully stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    match logging.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
