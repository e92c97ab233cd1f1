use crate::constants::GENESIS_PREVIOUS_HASH;
use crate::error::Result;
use crate::hash::HashEngine;
use crate::transaction::LedgerTransaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sealed, hash-linked batch of transactions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<LedgerTransaction>,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
    /// Difficulty in force when the block was sealed. Informational only, it
    /// is not part of the hash input.
    #[serde(default)]
    pub difficulty: u32,
}

impl Block {
    /// The fixed first block. It is hashed but never mined.
    pub fn genesis(timestamp: DateTime<Utc>) -> Result<Self> {
        let template = BlockTemplate::new(0, timestamp, Vec::new(), GENESIS_PREVIOUS_HASH.into());
        let hash = template.hash_with_nonce(0)?;
        Ok(template.seal(0, hash, 0))
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Recompute the digest from the stored fields.
    pub fn compute_hash(&self) -> Result<String> {
        Ok(block_prefix(
            self.index,
            &self.timestamp,
            &self.transactions,
            &self.previous_hash,
        )?
        .number(self.nonce)
        .finish())
    }
}

/// A block under construction: everything but the nonce is fixed.
#[derive(Clone, Debug)]
pub struct BlockTemplate {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<LedgerTransaction>,
    pub previous_hash: String,
}

impl BlockTemplate {
    pub fn new(
        index: u64,
        timestamp: DateTime<Utc>,
        mut transactions: Vec<LedgerTransaction>,
        previous_hash: String,
    ) -> Self {
        for tx in &mut transactions {
            tx.block_number = Some(index);
        }
        Self {
            index,
            timestamp,
            transactions,
            previous_hash,
        }
    }

    /// Hasher state after absorbing every field that precedes the nonce.
    pub fn prefix(&self) -> Result<HashEngine> {
        block_prefix(
            self.index,
            &self.timestamp,
            &self.transactions,
            &self.previous_hash,
        )
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> Result<String> {
        Ok(self.prefix()?.number(nonce).finish())
    }

    pub fn seal(self, nonce: u64, hash: String, difficulty: u32) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            transactions: self.transactions,
            previous_hash: self.previous_hash,
            hash,
            nonce,
            difficulty,
        }
    }
}

fn block_prefix(
    index: u64,
    timestamp: &DateTime<Utc>,
    transactions: &[LedgerTransaction],
    previous_hash: &str,
) -> Result<HashEngine> {
    HashEngine::new()
        .number(index)
        .part(timestamp)?
        .part(transactions)?
        .part(previous_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::NewTransaction;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn sample_txs() -> Vec<LedgerTransaction> {
        [("a", "alice", 1), ("b", "bob", 2)]
            .into_iter()
            .map(|(kind, signer, n)| {
                let req = NewTransaction::new(kind, signer, json!({ "n": n }));
                LedgerTransaction::admit(req, ts()).unwrap()
            })
            .collect()
    }

    #[test]
    fn genesis_example() {
        let genesis = Block::genesis(ts()).unwrap();
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.nonce, 0);
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.hash, genesis.compute_hash().unwrap());
    }

    #[test]
    fn template_stamps_block_number() {
        let template = BlockTemplate::new(3, ts(), sample_txs(), "ab".into());
        assert!(template.transactions.iter().all(|t| t.block_number == Some(3)));
    }

    #[test]
    fn sealed_hash_matches_recomputation() {
        let template = BlockTemplate::new(1, ts(), sample_txs(), "ab".into());
        let hash = template.hash_with_nonce(17).unwrap();
        let block = template.seal(17, hash.clone(), 1);
        assert_eq!(block.compute_hash().unwrap(), hash);
    }

    #[test]
    fn hash_changes_with_nonce() {
        let template = BlockTemplate::new(1, ts(), sample_txs(), "ab".into());
        assert_ne!(
            template.hash_with_nonce(0).unwrap(),
            template.hash_with_nonce(1).unwrap()
        );
    }

    #[test]
    fn hash_changes_with_payload() {
        let template = BlockTemplate::new(1, ts(), sample_txs(), "ab".into());
        let hash = template.hash_with_nonce(0).unwrap();
        let mut block = template.seal(0, hash.clone(), 0);
        block.transactions[0].data = json!({"n": 999});
        assert_ne!(block.compute_hash().unwrap(), hash);
    }

    #[test]
    fn block_serialization_example() {
        let template = BlockTemplate::new(1, ts(), sample_txs(), "ab".into());
        let hash = template.hash_with_nonce(5).unwrap();
        let block = template.seal(5, hash, 2);
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["previousHash"], "ab");
        assert_eq!(json["transactions"][0]["blockNumber"], 1);
        let back: Block = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
        assert_eq!(back.compute_hash().unwrap(), block.hash);
    }

    #[test]
    fn missing_difficulty_defaults_to_zero() {
        let genesis = Block::genesis(ts()).unwrap();
        let mut json = serde_json::to_value(&genesis).unwrap();
        json.as_object_mut().unwrap().remove("difficulty");
        let back: Block = serde_json::from_value(json).unwrap();
        assert_eq!(back.difficulty, 0);
    }
}
