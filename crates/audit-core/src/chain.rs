//! The ordered, hash-linked sequence of blocks.

use crate::block::{Block, BlockTemplate};
use crate::constants::{GENESIS_PREVIOUS_HASH, MAX_DIFFICULTY};
use crate::error::{IntegrityError, LedgerError, Result, ValidationError};
use crate::pow::{self, MiningOptions};
use crate::transaction::LedgerTransaction;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Where a sealed transaction lives: block index and position inside it.
type Location = (usize, usize);

#[derive(Clone, Debug)]
pub struct Ledger {
    blocks: Vec<Block>,
    difficulty: u32,
    sealed: HashMap<String, Location>,
}

impl Ledger {
    /// A chain holding only the genesis block.
    pub fn new(difficulty: u32, genesis_timestamp: DateTime<Utc>) -> Result<Self> {
        check_difficulty(difficulty)?;
        Ok(Self {
            blocks: vec![Block::genesis(genesis_timestamp)?],
            difficulty,
            sealed: HashMap::new(),
        })
    }

    /// Rebuild a ledger from externally supplied blocks after full
    /// verification.
    pub fn from_blocks(blocks: Vec<Block>, difficulty: u32) -> Result<Self> {
        check_difficulty(difficulty)?;
        verify_blocks(&blocks)?;
        let sealed = index_transactions(&blocks)?;
        Ok(Self {
            blocks,
            difficulty,
            sealed,
        })
    }

    pub fn latest_block(&self) -> &Block {
        // The chain always holds at least the genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(index).ok()?)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn contains_transaction(&self, hash: &str) -> bool {
        self.sealed.contains_key(hash)
    }

    /// The block a transaction was sealed into, with the sealed copy.
    pub fn locate(&self, hash: &str) -> Option<(&Block, &LedgerTransaction)> {
        let &(block, position) = self.sealed.get(hash)?;
        let block = &self.blocks[block];
        Some((block, &block.transactions[position]))
    }

    pub fn transactions(&self) -> impl Iterator<Item = &LedgerTransaction> {
        self.blocks.iter().flat_map(|b| b.transactions.iter())
    }

    pub fn transaction_count(&self) -> usize {
        self.sealed.len()
    }

    /// Template for the next block on top of the current tip.
    pub fn next_template(
        &self,
        transactions: Vec<LedgerTransaction>,
        timestamp: DateTime<Utc>,
    ) -> BlockTemplate {
        let latest = self.latest_block();
        BlockTemplate::new(latest.index + 1, timestamp, transactions, latest.hash.clone())
    }

    /// Seal `transactions` into a new block on top of the tip and append it.
    pub fn mine_block(
        &mut self,
        transactions: Vec<LedgerTransaction>,
        timestamp: DateTime<Utc>,
        options: &MiningOptions,
    ) -> Result<&Block> {
        let template = self.next_template(transactions, timestamp);
        let block = pow::mine(template, self.difficulty, options)?;
        self.append(block)?;
        Ok(self.latest_block())
    }

    /// Append an already sealed block. It must extend the current tip, carry
    /// a hash that matches its content, and hold no transaction that is
    /// already sealed.
    pub fn append(&mut self, block: Block) -> Result<()> {
        let latest = self.latest_block();
        if block.index != latest.index + 1 {
            return Err(IntegrityError::IndexGap {
                expected: latest.index + 1,
                actual: block.index,
            }
            .into());
        }
        if block.previous_hash != latest.hash {
            return Err(IntegrityError::BrokenLink {
                index: block.index,
                expected: latest.hash.clone(),
                actual: block.previous_hash,
            }
            .into());
        }
        let computed = block.compute_hash()?;
        if computed != block.hash {
            return Err(IntegrityError::HashMismatch {
                index: block.index,
                expected: computed,
                actual: block.hash,
            }
            .into());
        }
        let mut seen = HashSet::new();
        if let Some(dup) = block
            .transactions
            .iter()
            .find(|tx| self.sealed.contains_key(&tx.hash) || !seen.insert(tx.hash.as_str()))
        {
            return Err(ValidationError::Duplicate(dup.hash.clone()).into());
        }

        let slot = self.blocks.len();
        for (position, tx) in block.transactions.iter().enumerate() {
            self.sealed.insert(tx.hash.clone(), (slot, position));
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Walk the chain and return the first violation.
    pub fn verify(&self) -> std::result::Result<(), IntegrityError> {
        verify_blocks(&self.blocks)
    }

    pub fn is_chain_valid(&self) -> bool {
        match self.verify() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "chain integrity check failed");
                false
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }
}

fn check_difficulty(difficulty: u32) -> Result<()> {
    if difficulty > MAX_DIFFICULTY {
        return Err(LedgerError::Config(format!(
            "difficulty {difficulty} exceeds the digest length {MAX_DIFFICULTY}"
        )));
    }
    Ok(())
}

/// Genesis shape, index continuity, prev-hash linkage and recomputed hash
/// for every non-genesis block.
pub fn verify_blocks(blocks: &[Block]) -> std::result::Result<(), IntegrityError> {
    let genesis = blocks.first().ok_or(IntegrityError::Empty)?;
    if !genesis.is_genesis() || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(IntegrityError::InvalidGenesis);
    }
    verify_linkage(blocks)?;
    for block in &blocks[1..] {
        let computed = block
            .compute_hash()
            .map_err(|_| IntegrityError::HashMismatch {
                index: block.index,
                expected: String::new(),
                actual: block.hash.clone(),
            })?;
        if computed != block.hash {
            return Err(IntegrityError::HashMismatch {
                index: block.index,
                expected: computed,
                actual: block.hash.clone(),
            });
        }
    }
    Ok(())
}

/// Index continuity and prev-hash linkage only, no hash recomputation.
pub fn verify_linkage(blocks: &[Block]) -> std::result::Result<(), IntegrityError> {
    for pair in blocks.windows(2) {
        let (prev, block) = (&pair[0], &pair[1]);
        if block.index != prev.index + 1 {
            return Err(IntegrityError::IndexGap {
                expected: prev.index + 1,
                actual: block.index,
            });
        }
        if block.previous_hash != prev.hash {
            return Err(IntegrityError::BrokenLink {
                index: block.index,
                expected: prev.hash.clone(),
                actual: block.previous_hash.clone(),
            });
        }
    }
    Ok(())
}

fn index_transactions(blocks: &[Block]) -> Result<HashMap<String, Location>> {
    let mut sealed = HashMap::new();
    for (slot, block) in blocks.iter().enumerate() {
        for (position, tx) in block.transactions.iter().enumerate() {
            if sealed.insert(tx.hash.clone(), (slot, position)).is_some() {
                return Err(LedgerError::InvalidFormat(format!(
                    "transaction {} is sealed more than once",
                    tx.hash
                )));
            }
        }
    }
    Ok(sealed)
}
