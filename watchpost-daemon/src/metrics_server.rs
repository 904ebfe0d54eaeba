//! Prometheus metrics endpoint.
//!
//! Uses the built-in HTTP listener of `metrics-exporter-prometheus`; every
//! `metrics::counter!()` / `gauge!()` / `histogram!()` call in the engine
//! crates is scraped from `http://<listen_addr>:<port>/metrics`.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use watchpost_core::config::MetricsConfig;
use watchpost_core::metrics as m;

/// Resolve the listener address from `[metrics]`.
///
/// Only the `/metrics` path is served by the exporter.
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is served",
            config.endpoint
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Install the global metrics recorder and start the HTTP listener.
///
/// Call once per process; a second call fails because the recorder is global.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_addr(config)?;
    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    m::describe_all();
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_address_is_loopback() {
        let addr = listen_addr(&MetricsConfig::default()).unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:9100");
    }

    #[test]
    fn rejects_custom_endpoint_and_bad_address() {
        let config = MetricsConfig {
            endpoint: "/stats".to_owned(),
            ..MetricsConfig::default()
        };
        assert!(listen_addr(&config).is_err());

        let config = MetricsConfig {
            listen_addr: "not-an-ip".to_owned(),
            ..MetricsConfig::default()
        };
        assert!(listen_addr(&config).is_err());
    }
}
