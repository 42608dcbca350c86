// src/telemetry.rs
//! Logging and metrics bootstrap for the binaries.

use std::net::SocketAddr;

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "saylor_watch=info,warn";

/// `RUST_LOG` filter (default `saylor_watch=info,warn`), compact lines or
/// JSON when `LOG_FORMAT=json`. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Register metric descriptions once per process.
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("watch_cycles_total", "Completed watch cycles by classification");
        describe_counter!(
            "watch_source_errors_total",
            "Failed source attempts by source and error kind"
        );
        describe_counter!("watch_notifications_total", "Notification outcomes by result");
        describe_counter!(
            "watch_ticks_dropped_total",
            "Scheduled ticks dropped because a cycle was in flight"
        );
        describe_gauge!("watch_last_cycle_ts", "Unix time of the last finished cycle per target");
    });
}

/// Install the Prometheus exporter when `METRICS_ADDR` is set (e.g. `0.0.0.0:9100`).
/// Must run inside a tokio runtime.
pub fn install_metrics_from_env() -> anyhow::Result<Option<SocketAddr>> {
    let Ok(raw) = std::env::var("METRICS_ADDR") else {
        return Ok(None);
    };
    let addr: SocketAddr = raw
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("METRICS_ADDR {raw:?} is not a socket address: {e}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("installing prometheus exporter: {e}"))?;
    describe_metrics();
    Ok(Some(addr))
}
