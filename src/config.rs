//! Import configuration.
//!
//! Everything that tunes an import pass lives here and is handed to the
//! [`Importer`](crate::Importer) explicitly; there is no global state.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Accounts the structural strategy must yield before the adjacency
/// fallback is skipped
pub const DEFAULT_MIN_ACCOUNT_YIELD: usize = 3;

/// Per-entity record cap for the run-based extractors
pub const DEFAULT_MAX_RECORDS: usize = 500;

/// Configuration for one import pass
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// Minimum yield for an account strategy to be accepted outright
    pub min_account_yield: usize,

    /// Maximum records kept per party/inventory entity
    pub max_records: usize,

    /// Members larger than this are truncated before scanning
    pub max_member_bytes: Option<u64>,

    /// Abandon an entity task that runs longer than this
    pub entity_timeout_ms: Option<u64>,

    /// Write raw member bytes here before scanning
    pub dump_dir: Option<PathBuf>,

    /// Emit a debug event for every recovered record
    pub trace_records: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            min_account_yield: DEFAULT_MIN_ACCOUNT_YIELD,
            max_records: DEFAULT_MAX_RECORDS,
            max_member_bytes: None,
            entity_timeout_ms: None,
            dump_dir: None,
            trace_records: false,
        }
    }
}

impl ImportConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn entity_timeout(&self) -> Option<Duration> {
        self.entity_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_account_yield == 0 {
            return Err(ConfigError::ZeroAccountYield);
        }
        if self.max_records == 0 {
            return Err(ConfigError::ZeroRecordCap);
        }
        if self.max_member_bytes == Some(0) {
            return Err(ConfigError::ZeroMemberBudget);
        }
        if self.entity_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}
