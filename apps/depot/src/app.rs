//! Depot application wiring: storage, server, stale sweep, shutdown.

use std::sync::Arc;
use std::time::Duration;

use chunkferry_server::{ServerConfig, UploadServer};
use chunkferry_store::{StorageLayout, UploadSession};

use crate::config::Config;
use crate::handler::DepotHandler;

/// Runs the depot until ctrl-c.
pub async fn run(config: Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.storage_root).await?;
    let layout = StorageLayout::new(&config.storage_root);
    let session = UploadSession::new(layout).with_digest_verification(config.verify_digest);

    let handler = DepotHandler::new(session.clone());
    let server = UploadServer::new(ServerConfig { port: config.port }, handler);

    // Periodic garbage collection of abandoned partial uploads.
    let sweep_session = session.clone();
    let sweep_interval = Duration::from_secs(config.sweep_interval_secs.max(1));
    let sweep_ttl = Duration::from_secs(config.sweep_ttl_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweep_session.sweep_stale(sweep_ttl).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "swept stale uploads"),
                Err(e) => tracing::warn!("stale sweep failed: {e}"),
            }
        }
    });

    let server_task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    tracing::info!(storage = %config.storage_root, "depot running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("ctrl-c received, shutting down");

    server.shutdown();
    server_task.await??;
    Ok(())
}
