//! Prometheus metrics

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Which upstream a fetch went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSide {
    /// Polymarket event quotes
    Event,
    /// Deribit option quotes
    Option,
    /// Discovery listing or chain fetch
    Discovery,
}

impl FetchSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchSide::Event => "event",
            FetchSide::Option => "option",
            FetchSide::Discovery => "discovery",
        }
    }
}

/// Start the Prometheus scrape endpoint on `0.0.0.0:<port>`
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter on {}: {}", addr, e))?;

    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Record how long a fetch took
pub fn record_fetch_latency(side: FetchSide, duration: Duration) {
    metrics::histogram!("polylink_fetch_latency_ms", "side" => side.as_str())
        .record(duration.as_secs_f64() * 1000.0);
}

pub fn record_fetch_failure(side: FetchSide) {
    metrics::counter!("polylink_fetch_failures_total", "side" => side.as_str()).increment(1);
}

pub fn record_snapshot_written() {
    metrics::counter!("polylink_snapshots_written_total").increment(1);
}

pub fn record_fallback_write() {
    metrics::counter!("polylink_sink_fallback_writes_total").increment(1);
}

pub fn record_unmatched(reason: &'static str) {
    metrics::counter!("polylink_unmatched_events_total", "reason" => reason).increment(1);
}

pub fn set_active_pairs(count: usize) {
    metrics::gauge!("polylink_active_pairs").set(count as f64);
}
