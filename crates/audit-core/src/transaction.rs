//! Ledger-level transactions.

use crate::error::Result;
use crate::hash::HashEngine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// What a caller hands to `submit`. Missing fields deserialize to their empty
/// form so that validation, not the JSON layer, decides what is acceptable.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub signed_by: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub metadata: Value,
}

impl NewTransaction {
    pub fn new(kind: impl Into<String>, signed_by: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            signed_by: signed_by.into(),
            data,
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An admitted transaction, either pending in the pool or sealed in a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub signed_by: String,
    pub data: Value,
    #[serde(default)]
    pub metadata: Value,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub block_number: Option<u64>,
}

impl LedgerTransaction {
    /// Stamp a request with its admission instant and derived hash.
    pub fn admit(request: NewTransaction, admitted_at: DateTime<Utc>) -> Result<Self> {
        let hash = transaction_hash(
            &request.kind,
            &request.signed_by,
            &request.data,
            &admitted_at,
        )?;
        let metadata = match request.metadata {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            kind: request.kind,
            signed_by: request.signed_by,
            data: request.data,
            metadata,
            hash,
            timestamp: admitted_at,
            block_number: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.block_number.is_none()
    }

    /// Look up a correlation key (`projectId`, `userId`, ...) in the payload
    /// first and the annotations second.
    pub fn correlation(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .or_else(|| self.metadata.get(key))
            .and_then(correlation_str)
    }
}

fn correlation_str(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        _ => None,
    }
}

/// Hash over type, signer, canonical payload and admission instant. The
/// instant is part of the input, so resubmitting the same payload later
/// yields a different hash.
pub fn transaction_hash(
    kind: &str,
    signed_by: &str,
    data: &Value,
    timestamp: &DateTime<Utc>,
) -> Result<String> {
    Ok(HashEngine::new()
        .part(kind)?
        .part(signed_by)?
        .part(data)?
        .part(timestamp)?
        .finish())
}
