//! Document-level configuration, loaded with the `config` crate (layered
//! defaults -> optional file -> `WEAVE_`-prefixed environment overrides).

use serde::{Deserialize, Serialize};

use crate::error::{DocumentError, DocumentResult};

/// Configuration options for the document engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// 64-bit peer id used by the substrate (design §6). Random per
    /// process if not pinned by the caller.
    pub peer_id: u64,

    /// Undo manager tuning (design §4.7).
    pub max_undo_steps: u32,
    pub undo_merge_interval_ms: u64,

    /// Formula evaluator safety limit (design §4.10).
    pub formula_max_depth: usize,

    /// Default ping interval for `connect_to_sync`, in milliseconds
    /// (design §5).
    pub sync_ping_interval_ms: Option<u64>,

    pub logging: crate::observability::LoggingConfig,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            peer_id: 1,
            max_undo_steps: crate::undo::DEFAULT_MAX_STEPS,
            undo_merge_interval_ms: crate::undo::DEFAULT_MERGE_INTERVAL_MS,
            formula_max_depth: crate::formula::DEFAULT_MAX_DEPTH,
            sync_ping_interval_ms: None,
            logging: crate::observability::LoggingConfig::default(),
        }
    }
}

impl DocumentConfig {
    /// Loads configuration layered as defaults -> optional file at `path`
    /// -> environment variables prefixed `WEAVE_` (e.g. `WEAVE_PEER_ID`).
    pub fn load(path: Option<&str>) -> DocumentResult<Self> {
        let defaults = Self::default();
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&defaults)?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("WEAVE").separator("__"));

        let settings = builder.build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DocumentResult<()> {
        if self.max_undo_steps == 0 {
            return Err(DocumentError::Configuration("max_undo_steps must be greater than 0".into()));
        }
        if self.formula_max_depth == 0 {
            return Err(DocumentError::Configuration("formula_max_depth must be greater than 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(DocumentConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_undo_steps_is_rejected() {
        let mut config = DocumentConfig::default();
        config.max_undo_steps = 0;
        assert!(config.validate().is_err());
    }
}
