//! Whole-state export and import.

use crate::block::Block;
use crate::chain::Ledger;
use crate::constants::{DEFAULT_DIFFICULTY, SNAPSHOT_VERSION};
use crate::error::{LedgerError, Result};
use crate::pool::TransactionPool;
use crate::query::Settlements;
use crate::settlement::SettlementRecord;
use crate::transaction::LedgerTransaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    #[serde(default = "default_version")]
    pub version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    pub chain: Vec<Block>,
    #[serde(default)]
    pub pending_transactions: Vec<LedgerTransaction>,
    #[serde(default)]
    pub settlements: Vec<SettlementRecord>,
}

fn default_version() -> String {
    SNAPSHOT_VERSION.to_string()
}

fn default_difficulty() -> u32 {
    DEFAULT_DIFFICULTY
}

/// Everything a ledger service swaps in on import.
pub struct RestoredState {
    pub ledger: Ledger,
    pub pool: TransactionPool,
    pub settlements: Settlements,
}

impl ChainSnapshot {
    pub fn capture(
        ledger: &Ledger,
        pool: &TransactionPool,
        settlements: &Settlements,
        exported_at: DateTime<Utc>,
    ) -> Self {
        let mut records: Vec<SettlementRecord> = settlements.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.hash.cmp(&b.hash)));
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            exported_at,
            difficulty: ledger.difficulty(),
            chain: ledger.blocks().to_vec(),
            pending_transactions: pool.iter().cloned().collect(),
            settlements: records,
        }
    }

    /// Decode a snapshot from loosely typed JSON. A missing or malformed
    /// `chain` field is a format error, not an integrity error.
    pub fn from_json(value: Value) -> Result<Self> {
        match value.get("chain") {
            Some(Value::Array(_)) => {}
            Some(_) => return Err(LedgerError::InvalidFormat("`chain` must be an array".into())),
            None => return Err(LedgerError::InvalidFormat("missing `chain` field".into())),
        }
        let snapshot: Self = serde_json::from_value(value)
            .map_err(|e| LedgerError::InvalidFormat(e.to_string()))?;
        let major = snapshot.version.split('.').next().unwrap_or_default();
        if major != SNAPSHOT_VERSION.split('.').next().unwrap_or_default() {
            return Err(LedgerError::InvalidFormat(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Fully verify the snapshot and build the state it describes.
    pub fn restore(self) -> Result<RestoredState> {
        if self.chain.is_empty() {
            return Err(LedgerError::InvalidFormat("`chain` is empty".into()));
        }
        let ledger = Ledger::from_blocks(self.chain, self.difficulty)?;

        if let Some(tx) = self
            .pending_transactions
            .iter()
            .find(|tx| ledger.contains_transaction(&tx.hash))
        {
            return Err(LedgerError::InvalidFormat(format!(
                "pending transaction {} is already sealed",
                tx.hash
            )));
        }
        let pending = self
            .pending_transactions
            .into_iter()
            .map(|mut tx| {
                tx.block_number = None;
                tx
            })
            .collect();
        let pool = TransactionPool::from_entries(pending).map_err(|hash| {
            LedgerError::InvalidFormat(format!("duplicate pending transaction {hash}"))
        })?;

        let settlements = self
            .settlements
            .into_iter()
            .filter(|record| {
                let known =
                    ledger.contains_transaction(&record.hash) || pool.contains(&record.hash);
                if !known {
                    warn!(
                        hash = %record.hash,
                        status = %record.status,
                        "dropping settlement record for unknown transaction"
                    );
                }
                known
            })
            .map(|record| (record.hash.clone(), record))
            .collect();

        Ok(RestoredState {
            ledger,
            pool,
            settlements,
        })
    }
}
