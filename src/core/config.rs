//! Governance configuration.
//!
//! Loaded from a TOML file; every table and field has a default, so a missing
//! file or an empty document yields a working configuration.

use crate::core::error::GovernanceError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_RULE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GovernanceConfig {
    pub engine: EngineConfig,
    pub audit: AuditConfig,
    pub drift: DriftConfig,
}

/// Validation engine settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Budget for each rule, measured from the moment that rule starts.
    pub rule_timeout_ms: u64,
    /// Rule ids that are registered but start disabled.
    pub disabled_rules: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rule_timeout_ms: DEFAULT_RULE_TIMEOUT_MS,
            disabled_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Durable SQLite mirror for audit records.
    pub mirror_db: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriftConfig {
    /// Fold version-mismatch findings into `detect_all_drift`.
    pub include_version_mismatch: bool,
}

impl GovernanceConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, GovernanceError> {
        let config: GovernanceConfig =
            toml::from_str(content).map_err(|e| GovernanceError::ConfigError(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), GovernanceError> {
        if self.engine.rule_timeout_ms == 0 {
            return Err(GovernanceError::ConfigError(
                "engine.rule_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load config from `path`.
/// A missing file is not an error: it means "run with defaults".
pub fn load_config(path: &Path) -> Result<GovernanceConfig, GovernanceError> {
    if !path.exists() {
        debug!(path = %path.display(), "no governance config found, using defaults");
        return Ok(GovernanceConfig::default());
    }
    let content = fs::read_to_string(path).map_err(GovernanceError::IoError)?;
    let config = GovernanceConfig::from_toml_str(&content)?;
    debug!(path = %path.display(), "loaded governance config");
    Ok(config)
}
