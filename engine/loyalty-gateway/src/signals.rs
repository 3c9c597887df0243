//! Signal handling for graceful shutdown

use anyhow::Result;
use loyalty_service::LoyaltyService;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cancel `shutdown` on Ctrl+C (SIGINT) or SIGTERM
pub fn setup_signal_handlers(shutdown: CancellationToken) -> Result<()> {
    // Handle Ctrl+C (SIGINT)
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        info!("Ctrl+C signal received");
                        shutdown.cancel();
                    }
                    Err(e) => error!("Failed to listen for Ctrl+C signal: {}", e),
                },
                _ = shutdown.cancelled() => {}
            }
        });
    }

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, shutdown_flag.clone())?;

        tokio::spawn(async move {
            // Poll for signal
            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received");
                    shutdown.cancel();
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    Ok(())
}

/// Stop the sweeper and wait for the server to drain, each within `shutdown_timeout`
pub async fn graceful_shutdown(
    service: Arc<LoyaltyService>,
    server_handle: tokio::task::JoinHandle<()>,
    shutdown_timeout: Duration,
) -> Result<()> {
    info!("Starting graceful shutdown...");

    // Stop the session sweeper
    match timeout(shutdown_timeout, service.sessions().stop_sweeper()).await {
        Ok(()) => info!("Session sweeper stopped"),
        Err(_) => warn!("Session sweeper did not stop within timeout"),
    }

    // Wait for in-flight requests to finish
    match timeout(shutdown_timeout, server_handle).await {
        Ok(Ok(())) => {
            info!("HTTP server stopped gracefully");
        }
        Ok(Err(e)) => {
            error!("HTTP server task failed: {}", e);
        }
        Err(_) => {
            warn!("HTTP server did not stop within timeout, forcing shutdown");
        }
    }

    info!("Graceful shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_service::config::SessionConfig;
    use loyalty_service::{InMemoryStore, StaticAccrual};

    fn create_test_service() -> Arc<LoyaltyService> {
        let service = LoyaltyService::with_components(
            Arc::new(InMemoryStore::new()),
            Arc::new(StaticAccrual::new()),
            &SessionConfig { ttl_seconds: 120, sweep_interval_seconds: 1 },
        )
        .unwrap();
        Arc::new(service)
    }

    #[tokio::test]
    async fn test_graceful_shutdown_stops_sweeper_and_server() {
        let service = create_test_service();
        let shutdown = CancellationToken::new();
        service.sessions().start_sweeper(&shutdown);

        let server_token = shutdown.clone();
        let server = tokio::spawn(async move { server_token.cancelled().await });

        shutdown.cancel();
        graceful_shutdown(service.clone(), server, Duration::from_secs(1)).await.unwrap();
        assert!(!service.sessions().sweeper_running());
    }

    #[tokio::test]
    async fn test_graceful_shutdown_gives_up_on_stuck_server() {
        let service = create_test_service();
        let server = tokio::spawn(std::future::pending::<()>());

        let result = timeout(
            Duration::from_secs(2),
            graceful_shutdown(service, server, Duration::from_millis(50)),
        )
        .await;
        tokio_test::assert_ok!(tokio_test::assert_ok!(result));
    }
}
