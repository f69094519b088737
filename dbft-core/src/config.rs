// Copyright (c) Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Consensus configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Tunables of the consensus engine.
///
/// Every field has a default, so a config file only needs to list what it
/// overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Target time between blocks, in milliseconds
    pub block_interval_ms: u64,

    /// Cap on the backup timeout exponent (`interval << min(view + 1, cap)`)
    pub max_backoff_exponent: u32,

    /// How far a proposal timestamp may run ahead of the local clock
    pub max_future_timestamp_secs: u32,

    /// Largest accepted encoded payload or message, in bytes
    pub max_message_size: u64,

    /// Largest number of mempool transactions a primary puts in one proposal
    pub max_transactions_per_block: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            block_interval_ms: 15_000,
            max_backoff_exponent: 16,
            max_future_timestamp_secs: 600,
            max_message_size: 16 * 1024 * 1024,
            max_transactions_per_block: 500,
        }
    }
}

impl ConsensusConfig {
    /// Target time between blocks.
    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_interval_ms == 0 {
            return Err(ConfigError::invalid("block_interval_ms must be positive"));
        }
        if self.max_backoff_exponent >= 32 {
            return Err(ConfigError::invalid("max_backoff_exponent must be < 32"));
        }
        if self.block_interval_ms.leading_zeros() < self.max_backoff_exponent {
            return Err(ConfigError::invalid(
                "block_interval_ms << max_backoff_exponent overflows",
            ));
        }
        if self.max_message_size < 1024 {
            return Err(ConfigError::invalid("max_message_size must be at least 1024"));
        }
        if self.max_transactions_per_block == 0 {
            return Err(ConfigError::invalid(
                "max_transactions_per_block must be positive",
            ));
        }
        Ok(())
    }
}
