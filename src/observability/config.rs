//! Logging configuration and initialization.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::error::{DocumentError, DocumentResult};

/// Configuration for logging behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    pub console: bool,
    pub json_format: bool,
    pub with_thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            json_format: false,
            with_thread_names: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> DocumentResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(DocumentError::Configuration(format!(
                "invalid log level '{}', expected one of: {}",
                self.level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }
}

/// Initializes the global `tracing` subscriber from `config`. Safe to call
/// more than once per process (subsequent calls are a no-op via
/// `try_init`'s `Err`, which is logged and swallowed).
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    config.validate().map_err(|e| anyhow::anyhow!("logging configuration: {e}"))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if !config.console {
        return Ok(());
    }

    let layer = if config.json_format {
        tracing_subscriber::fmt::layer()
            .json()
            .with_thread_names(config.with_thread_names)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_thread_names(config.with_thread_names)
            .boxed()
    };

    if Registry::default().with(env_filter).with(layer).try_init().is_err() {
        tracing::debug!("global subscriber already set; skipping re-init");
    }

    Ok(())
}
