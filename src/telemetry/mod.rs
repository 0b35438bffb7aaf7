//! Telemetry module
//!
//! Structured logging and Prometheus metrics

mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use self::metrics::FetchSide;

use crate::config::TelemetryConfig;

/// Guard returned once telemetry is running
pub struct TelemetryGuard {
    _priv: (),
}

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level, config.log_format)?;

    if let Some(port) = config.metrics_port {
        self::metrics::install_exporter(port)?;
    }

    Ok(TelemetryGuard { _priv: () })
}
