//! Signal handling for graceful shutdown and config reload

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::service::ServiceState;

const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Setup signal handlers; the receiver yields the name of the first stop signal
pub fn setup_signal_handlers(service_state: Arc<ServiceState>) -> Result<mpsc::Receiver<&'static str>> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(2);

    // Handle Ctrl+C (SIGINT)
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C signal: {}", e);
                return;
            }

            info!("Ctrl+C signal received");
            let _ = shutdown_tx.send("SIGINT").await;
        });
    }

    // Handle SIGTERM and SIGHUP (Unix only)
    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGHUP, SIGTERM};
        use std::sync::atomic::{AtomicBool, Ordering};

        let terminate = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, terminate.clone())?;

        let reload = Arc::new(AtomicBool::new(false));
        let reload_enabled =
            service_state.config.service.reload_on_sighup && service_state.config.economy_file.is_some();
        if reload_enabled {
            signal_hook::flag::register(SIGHUP, reload.clone())?;
        }

        tokio::spawn(async move {
            loop {
                if terminate.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received");
                    let _ = shutdown_tx.send("SIGTERM").await;
                    break;
                }
                if reload.swap(false, Ordering::Relaxed) {
                    info!("SIGHUP signal received, reloading economy config");
                    if let Err(e) = service_state.reload_economy() {
                        error!("Economy config reload failed, keeping current config: {:#}", e);
                    }
                }
                tokio::time::sleep(SIGNAL_POLL_INTERVAL).await;
            }
        });
    }

    #[cfg(not(unix))]
    drop((service_state, shutdown_tx));

    Ok(shutdown_rx)
}

/// Graceful shutdown handler
pub async fn graceful_shutdown(service_state: Arc<ServiceState>) -> Result<()> {
    info!("Starting graceful shutdown...");

    let shutdown_timeout = Duration::from_secs(service_state.config.service.shutdown_timeout_secs);
    match timeout(shutdown_timeout, service_state.shutdown()).await {
        Ok(Ok(())) => {
            info!("PayoutScheduler stopped gracefully");
        }
        Ok(Err(e)) => {
            error!("Failed to shutdown service components: {:#}", e);
        }
        Err(_) => {
            warn!("PayoutScheduler did not stop within timeout, forcing shutdown");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use persistence::BackendKind;

    fn memory_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.persistence.backend = BackendKind::Memory;
        config.scheduler.catch_up_on_start = false;
        config
    }

    #[tokio::test]
    async fn test_graceful_shutdown_stops_scheduler() {
        let state = Arc::new(ServiceState::new(memory_config()).await.unwrap());
        state.start().await.unwrap();
        assert!(state.is_running());

        graceful_shutdown(state.clone()).await.unwrap();
        assert!(!state.is_running());
    }

    #[tokio::test]
    async fn test_graceful_shutdown_when_never_started() {
        let state = Arc::new(ServiceState::new(memory_config()).await.unwrap());
        graceful_shutdown(state.clone()).await.unwrap();
        assert!(!state.is_running());
    }
}
