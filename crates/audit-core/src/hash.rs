//! Deterministic content hashing.
//!
//! Every part is serialized to canonical JSON (object keys sorted, no
//! whitespace), the encodings are concatenated in the order given and the
//! result is run through SHA-256. The digest is rendered as lowercase hex.

use crate::error::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Streaming digest over ordered parts. Cloning preserves the absorbed
/// prefix, which the miner relies on to hash only the nonce per attempt.
#[derive(Clone, Default)]
pub struct HashEngine {
    hasher: Sha256,
}

impl HashEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one part in its canonical JSON form.
    pub fn part<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.hasher.update(canonical_json(value)?);
        Ok(self)
    }

    /// Absorb an unsigned integer. Equivalent to `part(&n)` without the
    /// round trip through `serde_json::Value`.
    pub fn number(mut self, n: u64) -> Self {
        self.hasher.update(n.to_string().as_bytes());
        self
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Canonical JSON bytes for any serializable value.
///
/// Going through `serde_json::Value` sorts object keys, so two payloads that
/// differ only in the order callers supplied their fields encode identically.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// One-shot digest over a list of already-built JSON values.
pub fn digest(parts: &[serde_json::Value]) -> Result<String> {
    parts
        .iter()
        .try_fold(HashEngine::new(), |engine, part| engine.part(part))
        .map(HashEngine::finish)
}

/// Number of leading `'0'` characters in a hex digest.
pub fn leading_zero_chars(hash: &str) -> u32 {
    hash.chars().take_while(|c| *c == '0').count() as u32
}

pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zero_chars(hash) >= difficulty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::HASH_HEX_SIZE;
    use serde_json::json;

    #[test]
    fn digest_is_deterministic() {
        let parts = [json!(1), json!("abc"), json!({"a": 1})];
        assert_eq!(digest(&parts).unwrap(), digest(&parts).unwrap());
        assert_eq!(digest(&parts).unwrap().len(), HASH_HEX_SIZE);
    }

    #[test]
    fn digest_of_known_input() {
        // sha256("1\"abc\"")
        let expected = {
            let mut h = Sha256::new();
            h.update(b"1\"abc\"");
            hex::encode(h.finalize())
        };
        assert_eq!(digest(&[json!(1), json!("abc")]).unwrap(), expected);
    }

    #[test]
    fn key_order_does_not_matter() {
        let a: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":{"y":1,"x":0}}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":{"x":0,"y":1},"b":2}"#).unwrap();
        assert_eq!(digest(&[a]).unwrap(), digest(&[b]).unwrap());
    }

    #[test]
    fn part_order_matters() {
        let ab = digest(&[json!("a"), json!("b")]).unwrap();
        let ba = digest(&[json!("b"), json!("a")]).unwrap();
        assert_ne!(ab, ba);
    }

    #[test]
    fn number_matches_part() {
        let via_number = HashEngine::new().number(42).finish();
        let via_part = HashEngine::new().part(&42u64).unwrap().finish();
        assert_eq!(via_number, via_part);
    }

    #[test]
    fn cloned_prefix_matches_full_hash() {
        let prefix = HashEngine::new().part("prefix").unwrap();
        let full = HashEngine::new().part("prefix").unwrap().number(7).finish();
        assert_eq!(prefix.clone().number(7).finish(), full);
        assert_ne!(prefix.number(8).finish(), full);
    }

    #[test]
    fn leading_zero_examples() {
        assert_eq!(leading_zero_chars("abc"), 0);
        assert_eq!(leading_zero_chars("0abc"), 1);
        assert_eq!(leading_zero_chars("0000f"), 4);
        assert!(meets_difficulty("00ff", 2));
        assert!(!meets_difficulty("00ff", 3));
        assert!(meets_difficulty("ff", 0));
    }
}
