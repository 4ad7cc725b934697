use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::governance::DEFAULT_INTEREST_RATE_BPS;
use crate::ledger::BasisPoints;
use crate::staking::RestakePolicy;

pub const DEFAULT_NAME: &str = "Central Bank Digital Currency";
pub const DEFAULT_SYMBOL: &str = "CBDC";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    pub name: String,
    pub symbol: String,
    /// Rate installed at genesis; governance may change it afterwards.
    pub default_interest_rate_bps: BasisPoints,
    pub restake_policy: RestakePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            symbol: DEFAULT_SYMBOL.to_string(),
            default_interest_rate_bps: DEFAULT_INTEREST_RATE_BPS,
            restake_policy: RestakePolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

impl LedgerConfig {
    /// Reads a JSON config; fields that are absent keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty"));
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("symbol must not be empty"));
        }
        Ok(())
    }
}
