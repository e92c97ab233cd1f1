//! Read-only views over the chain, the pool and the settlement records.

use crate::chain::Ledger;
use crate::pool::TransactionPool;
use crate::settlement::{SettlementRecord, SettlementStatus};
use crate::transaction::LedgerTransaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type Settlements = HashMap<String, SettlementRecord>;

pub const PROJECT_KEY: &str = "projectId";
pub const USER_KEY: &str = "userId";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Sealed into a block.
    #[serde(rename_all = "camelCase")]
    Confirmed {
        hash: String,
        block_number: u64,
        confirmations: u64,
        timestamp: DateTime<Utc>,
        block_hash: String,
        settlement: Option<SettlementStatus>,
    },
    /// Still in the pool.
    #[serde(rename_all = "camelCase")]
    Pending {
        hash: String,
        confirmations: u64,
        timestamp: DateTime<Utc>,
        settlement: Option<SettlementStatus>,
    },
    NotFound {
        hash: String,
    },
}

impl TransactionStatus {
    pub fn is_found(&self) -> bool {
        !matches!(self, TransactionStatus::NotFound { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEvent {
    #[serde(rename_all = "camelCase")]
    Created {
        timestamp: DateTime<Utc>,
        signed_by: String,
        kind: String,
    },
    #[serde(rename_all = "camelCase")]
    Mined {
        timestamp: DateTime<Utc>,
        block_number: u64,
        block_hash: String,
        confirmations: u64,
    },
    #[serde(rename_all = "camelCase")]
    Confirmed {
        timestamp: DateTime<Utc>,
        confirmed_by: Option<String>,
    },
    Failed {
        timestamp: DateTime<Utc>,
        reason: Option<String>,
    },
}

impl HistoryEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            HistoryEvent::Created { timestamp, .. }
            | HistoryEvent::Mined { timestamp, .. }
            | HistoryEvent::Confirmed { timestamp, .. }
            | HistoryEvent::Failed { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    pub total_transactions: usize,
    pub pending_transactions: usize,
    pub confirmed_transactions: usize,
    pub failed_transactions: usize,
    pub total_blocks: usize,
    pub average_nonce: f64,
    pub average_difficulty: f64,
    pub difficulty: u32,
    pub latest_block_hash: String,
    pub latest_block_timestamp: DateTime<Utc>,
    pub is_chain_valid: bool,
}

fn confirmations(ledger: &Ledger, block_index: u64) -> u64 {
    (ledger.len() as u64).saturating_sub(block_index)
}

pub fn transaction_status(
    ledger: &Ledger,
    pool: &TransactionPool,
    settlements: &Settlements,
    hash: &str,
) -> TransactionStatus {
    let settlement = settlements.get(hash).map(|r| r.status);
    if let Some((block, _)) = ledger.locate(hash) {
        return TransactionStatus::Confirmed {
            hash: hash.to_string(),
            block_number: block.index,
            confirmations: confirmations(ledger, block.index),
            timestamp: block.timestamp,
            block_hash: block.hash.clone(),
            settlement,
        };
    }
    if let Some(tx) = pool.get(hash) {
        return TransactionStatus::Pending {
            hash: hash.to_string(),
            confirmations: 0,
            timestamp: tx.timestamp,
            settlement,
        };
    }
    TransactionStatus::NotFound {
        hash: hash.to_string(),
    }
}

/// Lifecycle events for one transaction, oldest first. Empty when the hash
/// is unknown to both the chain and the pool.
pub fn transaction_history(
    ledger: &Ledger,
    pool: &TransactionPool,
    settlements: &Settlements,
    hash: &str,
) -> Vec<HistoryEvent> {
    let mut events = Vec::new();
    let sealed = ledger.locate(hash);
    let tx = sealed.map(|(_, tx)| tx).or_else(|| pool.get(hash));
    let Some(tx) = tx else {
        return events;
    };

    events.push(HistoryEvent::Created {
        timestamp: tx.timestamp,
        signed_by: tx.signed_by.clone(),
        kind: tx.kind.clone(),
    });
    if let Some((block, _)) = sealed {
        events.push(HistoryEvent::Mined {
            timestamp: block.timestamp,
            block_number: block.index,
            block_hash: block.hash.clone(),
            confirmations: confirmations(ledger, block.index),
        });
    }
    if let Some(record) = settlements.get(hash) {
        match (record.status, record.settled_at) {
            (SettlementStatus::Confirmed, Some(at)) => events.push(HistoryEvent::Confirmed {
                timestamp: at,
                confirmed_by: record.confirmed_by.clone(),
            }),
            (SettlementStatus::Failed, Some(at)) => events.push(HistoryEvent::Failed {
                timestamp: at,
                reason: record.failure_reason.clone(),
            }),
            _ => {}
        }
    }
    events.sort_by_key(HistoryEvent::timestamp);
    events
}

/// Sealed and pending transactions whose correlation field `key` equals
/// `id`, newest first. With `match_signer`, transactions signed by `id`
/// also qualify.
pub fn correlated_transactions(
    ledger: &Ledger,
    pool: &TransactionPool,
    key: &str,
    id: &str,
    match_signer: bool,
) -> Vec<LedgerTransaction> {
    let mut matches: Vec<LedgerTransaction> = ledger
        .transactions()
        .chain(pool.iter())
        .filter(|tx| tx.correlation(key) == Some(id) || (match_signer && tx.signed_by == id))
        .cloned()
        .collect();
    matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matches
}

pub fn chain_stats(
    ledger: &Ledger,
    pool: &TransactionPool,
    settlements: &Settlements,
) -> ChainStats {
    let mined = &ledger.blocks()[1..];
    let (average_nonce, average_difficulty) = if mined.is_empty() {
        (0.0, 0.0)
    } else {
        let n = mined.len() as f64;
        let nonce: f64 = mined.iter().map(|b| b.nonce as f64).sum();
        let difficulty: f64 = mined.iter().map(|b| f64::from(b.difficulty)).sum();
        (nonce / n, difficulty / n)
    };
    let count = |status: SettlementStatus| {
        settlements
            .values()
            .filter(|r| r.status == status)
            .count()
    };
    let latest = ledger.latest_block();

    ChainStats {
        total_transactions: ledger.transaction_count(),
        pending_transactions: pool.len(),
        confirmed_transactions: count(SettlementStatus::Confirmed),
        failed_transactions: count(SettlementStatus::Failed),
        total_blocks: ledger.len(),
        average_nonce,
        average_difficulty,
        difficulty: ledger.difficulty(),
        latest_block_hash: latest.hash.clone(),
        latest_block_timestamp: latest.timestamp,
        is_chain_valid: ledger.is_chain_valid(),
    }
}
