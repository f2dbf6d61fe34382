//! Ops server binary

use anyhow::Context;
use ops_server::{Config, OpsServer, setup_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing is not initialized until the config is known
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    let _telemetry_guard = setup_tracing(&config.telemetry, &config.logging)
        .await
        .context("failed to initialize tracing")?;

    tracing::info!("Ops server starting");

    let server_config = config
        .to_server_config()
        .context("invalid server configuration")?;
    let server = OpsServer::build(server_config)
        .await
        .context("failed to build ops server")?;

    server.run().await.context("ops server failed")?;

    // Telemetry guard will flush spans on drop

    Ok(())
}
