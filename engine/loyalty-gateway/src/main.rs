//! Loyalty Gateway
//!
//! Entry point of the loyalty points backend: loads configuration, connects
//! the ledger, serves the REST API and shuts down gracefully on SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use loyalty_gateway::{
    graceful_shutdown, initialize_logging, rest_api, setup_signal_handlers, Args, GatewayConfig,
};
use loyalty_service::LoyaltyService;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    // Load configuration
    let config = GatewayConfig::load(&args).context("Failed to load configuration")?;

    initialize_logging(&config.logging)?;
    info!("Starting Loyalty Gateway v{}", loyalty_gateway::VERSION);

    // Setup signal handlers for graceful shutdown
    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone())?;
    info!("Signal handlers configured");

    // Connect the ledger
    let service = Arc::new(
        LoyaltyService::new(config.service.clone())
            .await
            .context("Failed to initialize loyalty service")?,
    );
    info!("Loyalty service initialized");

    service.sessions().start_sweeper(&shutdown);

    // Start the HTTP server
    let bind_address = config.bind_address();
    let address = tokio::net::lookup_host(&bind_address)
        .await
        .with_context(|| format!("Failed to resolve {}", bind_address))?
        .next()
        .with_context(|| format!("No address found for {}", bind_address))?;

    let routes = rest_api::create_routes(service.clone());
    let server_shutdown = shutdown.clone();
    let (bound, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(address, async move {
            server_shutdown.cancelled().await;
        })
        .with_context(|| format!("Failed to bind {}", address))?;
    let server_handle = tokio::spawn(server);

    info!("Loyalty Gateway listening on {}. Press Ctrl+C to shutdown gracefully.", bound);
    shutdown.cancelled().await;

    info!("Shutdown signal received. Initiating graceful shutdown...");
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    graceful_shutdown(service, server_handle, shutdown_timeout).await?;

    info!("Loyalty Gateway shutdown complete");
    Ok(())
}
