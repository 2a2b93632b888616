//! Matrix Mirror reconciler process.
//!
//! Startup sequence:
//!
//! 1. Load configuration from the environment
//! 2. Initialize tracing
//! 3. Build the container (stores, gateway, reconciler)
//! 4. Bootstrap the matrix anchor place (if not present)
//! 5. Run the reconciler loop until Ctrl-C

use anyhow::Result;
use mirror_runtime::{Mirror, RuntimeConfig};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        matrix = %config.matrix,
        poll_interval_ms = config.reconciler.poll_interval_ms,
        "starting matrix mirror"
    );

    let mirror = Mirror::new(config);
    mirror.bootstrap().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = mirror.spawn_reconciler(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown_tx.send(true)?;
    reconciler.await?;

    info!("matrix mirror stopped");
    Ok(())
}
