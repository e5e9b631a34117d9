//! Engine settings layered from built-in defaults and `LOCALDISC_*`
//! environment variables.
//!
//! Connection-string keys (see [`ConnectionTarget`](crate::engine::connection::ConnectionTarget))
//! and CLI flags are applied on top of what [`EngineConfig::load`] returns.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::ENV_PREFIX;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// How long SQLite waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
    /// Minimum percentage increase between two running progress reports.
    pub progress_step: u8,
    /// Whether finished imports are written to the history table.
    pub record_imports: bool,
    /// Fallback `tracing` filter when `LOCALDISC_LOG` is unset.
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            progress_step: 10,
            record_imports: true,
            log_filter: "local_disc=info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with the process environment.
    pub fn load() -> Result<Self> {
        Self::build(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Defaults overlaid with an explicit variable map instead of the process
    /// environment. Keys use the same `LOCALDISC_` names.
    pub fn load_from(vars: config::Map<String, String>) -> Result<Self> {
        Self::build(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(Some(vars)),
        )
    }

    fn build(env: config::Environment) -> Result<Self> {
        let defaults_json = serde_json::to_string(&Self::default())?;
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                &defaults_json,
                config::FileFormat::Json,
            ))
            .add_source(env)
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let cfg: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.progress_step) {
            return Err(EngineError::Config(format!(
                "progress_step must be within 1..=100, got {}",
                self.progress_step
            )));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
