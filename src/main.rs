//! Admission guard gateway.
//!
//! Loads configuration, starts the audit worker and garbage collector, then
//! serves the guarded routes until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use admission_guard::config::{load_config, GuardConfig};
use admission_guard::lifecycle::{serve_until, wait_for_termination, GuardServices, Shutdown};
use admission_guard::observability::{logging, metrics};
use admission_guard::security::SystemClock;
use admission_guard::GuardServer;

#[derive(Parser, Debug)]
#[command(name = "admission-guard", version, about = "Adaptive request admission gateway")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Let loopback traffic bypass inspection
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };
    if args.dev {
        config.inspector.dev_mode = true;
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "admission-guard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let (services, worker) = GuardServices::build(&config, Arc::new(SystemClock)).await?;
    let shutdown = Shutdown::new();
    let background = services.spawn_background(worker, &shutdown);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = GuardServer::new(&config, &services);
    serve_until(server, listener, wait_for_termination(), &shutdown, background).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
