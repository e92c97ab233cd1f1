//! Application-level confirmation track, independent of mining.
//!
//! Every admitted transaction gets a record that starts `Pending` and may
//! move once to `Confirmed` or `Failed`. Both are terminal.

use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Failed,
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Confirmed => "confirmed",
            SettlementStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub hash: String,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl SettlementRecord {
    pub fn pending(hash: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            hash: hash.into(),
            status: SettlementStatus::Pending,
            created_at,
            confirmed_by: None,
            signature: None,
            failure_reason: None,
            settled_at: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != SettlementStatus::Pending
    }

    pub fn confirm(
        &mut self,
        confirmed_by: impl Into<String>,
        signature: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        match self.status {
            SettlementStatus::Pending => {
                self.status = SettlementStatus::Confirmed;
                self.confirmed_by = Some(confirmed_by.into());
                self.signature = signature;
                self.settled_at = Some(at);
                Ok(())
            }
            SettlementStatus::Confirmed => Err(LedgerError::AlreadyConfirmed(self.hash.clone())),
            SettlementStatus::Failed => Err(LedgerError::AlreadySettled {
                hash: self.hash.clone(),
                status: self.status.to_string(),
            }),
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> Result<()> {
        if self.is_settled() {
            return Err(LedgerError::AlreadySettled {
                hash: self.hash.clone(),
                status: self.status.to_string(),
            });
        }
        self.status = SettlementStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.settled_at = Some(at);
        Ok(())
    }
}
