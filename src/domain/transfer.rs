//! Transfer
//!
//! Customer-facing money movement. Its financial effect lives in the linked
//! journal entry; the transfer record is the audit trail of the request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AccountId, Currency, EntryId, FailureReason, LedgerError, Money, TransferId};

/// PENDING -> EXECUTED | FAILED (both terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Executed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Executed => "EXECUTED",
            TransferStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransferStatus::Pending),
            "EXECUTED" => Ok(TransferStatus::Executed),
            "FAILED" => Ok(TransferStatus::Failed),
            other => Err(LedgerError::Storage(format!("unknown transfer status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount_minor: i64,
    pub currency: Currency,
    pub status: TransferStatus,
    pub failure_reason: Option<FailureReason>,
    pub journal_entry_id: Option<EntryId>,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
    /// Fingerprint of the request parameters, used to detect key reuse
    pub request_hash: String,
    pub requested_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    pub fn amount(&self) -> Money {
        Money::new(self.amount_minor, self.currency)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// PENDING -> EXECUTED
    pub(crate) fn executed(&self, entry_id: EntryId, at: DateTime<Utc>) -> Transfer {
        Transfer {
            status: TransferStatus::Executed,
            journal_entry_id: Some(entry_id),
            executed_at: Some(at),
            failure_reason: None,
            ..self.clone()
        }
    }

    /// PENDING -> FAILED
    pub(crate) fn failed(&self, reason: FailureReason) -> Transfer {
        Transfer {
            status: TransferStatus::Failed,
            failure_reason: Some(reason),
            journal_entry_id: None,
            executed_at: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Transfer {
        Transfer {
            id: TransferId::new(),
            from_account_id: AccountId::new(),
            to_account_id: AccountId::new(),
            amount_minor: 300,
            currency: Currency::USD,
            status: TransferStatus::Pending,
            failure_reason: None,
            journal_entry_id: None,
            description: None,
            idempotency_key: None,
            request_hash: String::new(),
            requested_at: Utc::now(),
            executed_at: None,
        }
    }

    #[test]
    fn test_executed_links_entry() {
        let entry_id = EntryId::new();
        let transfer = pending().executed(entry_id, Utc::now());
        assert_eq!(transfer.status, TransferStatus::Executed);
        assert_eq!(transfer.journal_entry_id, Some(entry_id));
        assert!(transfer.executed_at.is_some());
        assert!(transfer.is_terminal());
    }

    #[test]
    fn test_failed_has_no_entry() {
        let transfer = pending().failed(FailureReason::InsufficientFunds);
        assert_eq!(transfer.status, TransferStatus::Failed);
        assert_eq!(transfer.failure_reason, Some(FailureReason::InsufficientFunds));
        assert!(transfer.journal_entry_id.is_none());
    }

    #[test]
    fn test_pending_is_not_terminal() {
        assert!(!TransferStatus::Pending.is_terminal());
        assert_eq!(pending().amount(), Money::new(300, Currency::USD));
    }
}
