//! Prometheus exporter for the `metrics` facade

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::config::MetricsConfig;

/// Socket the exporter listens on
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid metrics address {}:{}", config.host, config.port))
}

/// Install the global recorder and serve `/metrics`; no-op when disabled
pub fn install_metrics_exporter(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = listen_addr(config)?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    metrics::describe_counter!("payout_epochs_total", "Payout epochs completed");
    metrics::describe_counter!("payout_epochs_failed_total", "Payout epochs that errored or timed out");
    metrics::describe_counter!("payout_currency_distributed_total", "Currency credited by payout epochs");
    metrics::describe_histogram!("payout_epoch_duration_seconds", "Wall time of a payout epoch");

    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addr() {
        let config = MetricsConfig { host: "127.0.0.1".to_string(), port: 9300, ..Default::default() };
        assert_eq!(listen_addr(&config).unwrap(), "127.0.0.1:9300".parse::<SocketAddr>().unwrap());

        let config = MetricsConfig { host: "not a host".to_string(), ..Default::default() };
        assert!(listen_addr(&config).is_err());
    }

    #[test]
    fn test_disabled_exporter_is_noop() {
        let config = MetricsConfig { enabled: false, ..Default::default() };
        assert!(install_metrics_exporter(&config).is_ok());
    }
}
