//! Admission checks for new transactions.

use crate::chain::Ledger;
use crate::error::ValidationError;
use crate::pool::TransactionPool;
use crate::signature::SignatureVerifier;
use crate::transaction::{transaction_hash, LedgerTransaction};
use serde_json::Value;

pub fn validate_transaction(
    tx: &LedgerTransaction,
    pool: &TransactionPool,
    ledger: &Ledger,
    verifier: &dyn SignatureVerifier,
) -> Result<(), ValidationError> {
    check_fields(tx)?;
    if pool.contains(&tx.hash) || ledger.contains_transaction(&tx.hash) {
        return Err(ValidationError::Duplicate(tx.hash.clone()));
    }
    if !verifier.verify(&tx.signed_by, &tx.hash, None) {
        return Err(ValidationError::SignatureRejected(tx.signed_by.clone()));
    }
    Ok(())
}

/// Required fields are present and the stored hash matches the content.
pub fn check_fields(tx: &LedgerTransaction) -> Result<(), ValidationError> {
    if tx.kind.trim().is_empty() {
        return Err(ValidationError::MissingField("type"));
    }
    if tx.signed_by.trim().is_empty() {
        return Err(ValidationError::MissingField("signedBy"));
    }
    if tx.data == Value::Null {
        return Err(ValidationError::MissingField("data"));
    }
    let computed = transaction_hash(&tx.kind, &tx.signed_by, &tx.data, &tx.timestamp).ok();
    if computed.as_deref() != Some(tx.hash.as_str()) {
        return Err(ValidationError::HashMismatch(tx.hash.clone()));
    }
    Ok(())
}

/// Boolean form of [`validate_transaction`].
pub fn is_valid_transaction(
    tx: &LedgerTransaction,
    pool: &TransactionPool,
    ledger: &Ledger,
    verifier: &dyn SignatureVerifier,
) -> bool {
    validate_transaction(tx, pool, ledger, verifier).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::MiningOptions;
    use crate::signature::AcceptAllSignatures;
    use crate::transaction::NewTransaction;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    struct RejectAll;

    impl SignatureVerifier for RejectAll {
        fn verify(&self, _: &str, _: &str, _: Option<&str>) -> bool {
            false
        }
    }

    fn admit(req: NewTransaction) -> LedgerTransaction {
        LedgerTransaction::admit(req, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()).unwrap()
    }

    fn fixtures() -> (TransactionPool, Ledger) {
        let ledger = Ledger::new(1, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()).unwrap();
        (TransactionPool::new(), ledger)
    }

    #[test]
    fn accepts_complete_transaction() {
        let (pool, ledger) = fixtures();
        let tx = admit(NewTransaction::new("t", "u", json!({"amount": 1})));
        assert!(is_valid_transaction(&tx, &pool, &ledger, &AcceptAllSignatures));
    }

    #[test]
    fn rejects_missing_fields() {
        let (pool, ledger) = fixtures();
        let cases = [
            (NewTransaction::new("", "u", json!(1)), "type"),
            (NewTransaction::new("t", "  ", json!(1)), "signedBy"),
            (NewTransaction::new("t", "u", Value::Null), "data"),
        ];
        for (req, field) in cases {
            let tx = admit(req);
            assert_eq!(
                validate_transaction(&tx, &pool, &ledger, &AcceptAllSignatures),
                Err(ValidationError::MissingField(field))
            );
        }
    }

    #[test]
    fn rejects_hash_already_pending() {
        let (mut pool, ledger) = fixtures();
        let tx = admit(NewTransaction::new("t", "u", json!(1)));
        pool.push(tx.clone());
        assert!(matches!(
            validate_transaction(&tx, &pool, &ledger, &AcceptAllSignatures),
            Err(ValidationError::Duplicate(_))
        ));
    }

    #[test]
    fn rejects_hash_already_sealed() {
        let (pool, mut ledger) = fixtures();
        let tx = admit(NewTransaction::new("t", "u", json!(1)));
        ledger
            .mine_block(vec![tx.clone()], Utc::now(), &MiningOptions::default())
            .unwrap();
        assert!(!is_valid_transaction(&tx, &pool, &ledger, &AcceptAllSignatures));
    }

    #[test]
    fn rejects_hash_that_does_not_match_content() {
        let mut tx = admit(NewTransaction::new("t", "u", json!({"amount": 1})));
        tx.data = json!({"amount": 2});
        assert_eq!(check_fields(&tx), Err(ValidationError::HashMismatch(tx.hash.clone())));
    }

    #[test]
    fn verifier_can_refuse() {
        let (pool, ledger) = fixtures();
        let tx = admit(NewTransaction::new("t", "mallory", json!(1)));
        assert_eq!(
            validate_transaction(&tx, &pool, &ledger, &RejectAll),
            Err(ValidationError::SignatureRejected("mallory".into()))
        );
    }
}
