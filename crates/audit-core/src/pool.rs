//! Admitted transactions waiting to be sealed.

use crate::transaction::LedgerTransaction;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Clone, Debug, Default)]
pub struct TransactionPool {
    entries: Vec<LedgerTransaction>,
    hashes: HashSet<String>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from a list, refusing the first repeated hash.
    pub fn from_entries(entries: Vec<LedgerTransaction>) -> Result<Self, String> {
        let mut pool = Self::new();
        for tx in entries {
            if pool.contains(&tx.hash) {
                return Err(tx.hash);
            }
            pool.push(tx);
        }
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&LedgerTransaction> {
        if !self.contains(hash) {
            return None;
        }
        self.entries.iter().find(|tx| tx.hash == hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LedgerTransaction> {
        self.entries.iter()
    }

    /// Append a transaction that has already passed validation.
    pub fn push(&mut self, tx: LedgerTransaction) {
        self.hashes.insert(tx.hash.clone());
        self.entries.push(tx);
    }

    /// Oldest `limit` entries, in admission order.
    pub fn batch(&self, limit: usize) -> Vec<LedgerTransaction> {
        self.entries.iter().take(limit).cloned().collect()
    }

    /// Drop the given hashes, returning how many were present.
    pub fn remove_all<'a>(&mut self, hashes: impl IntoIterator<Item = &'a str>) -> usize {
        let doomed: HashSet<&str> = hashes
            .into_iter()
            .filter(|h| self.hashes.contains(*h))
            .collect();
        if doomed.is_empty() {
            return 0;
        }
        self.entries.retain(|tx| !doomed.contains(tx.hash.as_str()));
        for hash in &doomed {
            self.hashes.remove(*hash);
        }
        doomed.len()
    }

    /// Remove entries admitted before `cutoff`; returns the removed entries.
    pub fn remove_older_than(&mut self, cutoff: DateTime<Utc>) -> Vec<LedgerTransaction> {
        let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|tx| tx.timestamp < cutoff);
        for tx in &stale {
            self.hashes.remove(&tx.hash);
        }
        self.entries = fresh;
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::NewTransaction;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn tx_at(hours: i64) -> LedgerTransaction {
        LedgerTransaction::admit(
            NewTransaction::new("t", "u", json!({"h": hours})),
            t0() + Duration::hours(hours),
        )
        .unwrap()
    }

    #[test]
    fn push_and_lookup() {
        let mut pool = TransactionPool::new();
        let tx = tx_at(0);
        pool.push(tx.clone());
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&tx.hash));
        assert_eq!(pool.get(&tx.hash), Some(&tx));
        assert!(pool.get("missing").is_none());
    }

    #[test]
    fn batch_keeps_admission_order() {
        let mut pool = TransactionPool::new();
        let txs: Vec<_> = (0..5).map(tx_at).collect();
        for tx in &txs {
            pool.push(tx.clone());
        }
        let batch = pool.batch(3);
        assert_eq!(batch, txs[..3].to_vec());
        assert_eq!(pool.batch(10).len(), 5);
    }

    #[test]
    fn remove_all_counts_only_present() {
        let mut pool = TransactionPool::new();
        let a = tx_at(0);
        let b = tx_at(1);
        pool.push(a.clone());
        pool.push(b.clone());
        assert_eq!(pool.remove_all([a.hash.as_str(), "ghost"]), 1);
        assert!(!pool.contains(&a.hash));
        assert!(pool.contains(&b.hash));
    }

    #[test]
    fn remove_older_than_cutoff() {
        let mut pool = TransactionPool::new();
        for h in 0..4 {
            pool.push(tx_at(h));
        }
        let removed = pool.remove_older_than(t0() + Duration::hours(2));
        assert_eq!(removed.len(), 2);
        assert_eq!(pool.len(), 2);
        assert!(pool.iter().all(|tx| tx.timestamp >= t0() + Duration::hours(2)));
        assert!(removed.iter().all(|tx| !pool.contains(&tx.hash)));
    }

    #[test]
    fn from_entries_rejects_duplicates() {
        let tx = tx_at(0);
        let err = TransactionPool::from_entries(vec![tx.clone(), tx.clone()]).unwrap_err();
        assert_eq!(err, tx.hash);
    }
}
