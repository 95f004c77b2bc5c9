//! Chunkferry depot entry point.

use tracing_subscriber::EnvFilter;

use chunkferry_depot::{app, config};

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting chunkferry depot"
    );

    // Load configuration.
    let config = config::Config::load()?;
    tracing::info!(port = config.port, storage = %config.storage_root, "configuration loaded");

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config))?;

    tracing::info!("depot shut down cleanly");
    Ok(())
}
