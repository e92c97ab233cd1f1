//! Ledger configuration.

use crate::constants::{
    DEFAULT_DIFFICULTY, DEFAULT_PENDING_MAX_AGE_HOURS, DEFAULT_STALE_RETRIES,
    MAX_BLOCK_TRANSACTIONS, MAX_DIFFICULTY,
};
use crate::error::{LedgerError, Result};
use crate::pow::{CancelToken, MiningOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LedgerConfig {
    /// Required count of leading `'0'` hex characters in a sealed block hash.
    pub difficulty: u32,
    /// Upper bound on transactions sealed per block.
    pub max_block_transactions: usize,
    pub mining: MiningConfig,
    /// Default cut-off used by periodic pool cleanup.
    pub pending_max_age_hours: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MiningConfig {
    pub parallel: bool,
    pub max_attempts: Option<u64>,
    pub timeout_ms: Option<u64>,
    /// How many times a search is redone when the chain or pool moved
    /// underneath it.
    pub stale_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            max_block_transactions: MAX_BLOCK_TRANSACTIONS,
            mining: MiningConfig::default(),
            pending_max_age_hours: DEFAULT_PENDING_MAX_AGE_HOURS,
        }
    }
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_attempts: None,
            timeout_ms: None,
            stale_retries: DEFAULT_STALE_RETRIES,
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::Config(format!(
                "difficulty must be at most {MAX_DIFFICULTY}, got {}",
                self.difficulty
            )));
        }
        if self.max_block_transactions == 0 {
            return Err(LedgerError::Config(
                "maxBlockTransactions must be positive".into(),
            ));
        }
        if self.mining.max_attempts == Some(0) {
            return Err(LedgerError::Config("mining.maxAttempts must be positive".into()));
        }
        Ok(())
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| LedgerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl MiningConfig {
    pub fn options(&self, cancel: CancelToken) -> MiningOptions {
        MiningOptions {
            parallel: self.parallel,
            max_attempts: self.max_attempts,
            timeout: self.timeout_ms.map(Duration::from_millis),
            cancel,
        }
    }
}
