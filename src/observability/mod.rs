//! Observability: structured logging and metrics for the document engine.

pub mod config;
pub mod metrics;

pub use config::{init_logging, LoggingConfig};
pub use metrics::DocumentMetrics;

pub use tracing::{debug, error, info, instrument, trace, warn, Instrument, Span};

/// Performance timer for a named operation; logs start and completion at
/// debug/info level.
pub struct PerformanceTimer {
    start: std::time::Instant,
    operation: String,
}

impl PerformanceTimer {
    pub fn new(operation: &str) -> Self {
        tracing::debug!(operation, "starting operation");
        Self {
            start: std::time::Instant::now(),
            operation: operation.to_string(),
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        tracing::info!(operation = %self.operation, duration_ms = duration.as_millis(), "operation completed");
    }
}
