//! Electron relay server binary.
//!
//! # Usage
//!
//! ```bash
//! electron-server --bind 0.0.0.0:5000
//!
//! # Verbose relay logging
//! RUST_LOG=electron_server=debug electron-server
//! ```

use clap::Parser;
use electron_server::{AutomatedLimits, DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Electron session relay server
#[derive(Parser, Debug)]
#[command(name = "electron-server")]
#[command(about = "Relays stimulation parameters from drivers to riders")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:5000")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Maximum automated sessions one connection may run at once
    #[arg(long, default_value = "4")]
    max_automated_per_connection: usize,

    /// Maximum automated sessions running at once
    #[arg(long, default_value = "64")]
    max_automated_sessions: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Electron relay starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        driver: DriverConfig {
            max_connections: args.max_connections,
            automated: AutomatedLimits {
                per_connection: args.max_automated_per_connection,
                total: args.max_automated_sessions,
            },
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
