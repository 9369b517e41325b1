//! Ledger Error Types
//!
//! Typed failures of the ledger engine, independent of HTTP and storage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::{AccountId, AccountStatus, Currency, EntryId, MoneyError, TransferId};

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller-fixable input problem, nothing was written
    Validation,
    /// Expected business outcome (recorded on transfers)
    Business,
    /// Safe to retry with the same idempotency key
    Transient,
    /// Internal consistency check tripped; a bug signal
    Invariant,
    /// Unclassified backend failure
    Infrastructure,
}

/// Ledger engine errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // Validation
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot transfer to the same account")]
    SameAccount,

    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("Unbalanced entry: debits {debits}, credits {credits}")]
    UnbalancedEntry { debits: i64, credits: i64 },

    #[error("A journal entry needs at least two lines (got {0})")]
    TooFewLines(usize),

    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("Amount arithmetic overflow")]
    Overflow,

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Invalid account status transition: {from} -> {to}")]
    InvalidStatusTransition { from: AccountStatus, to: AccountStatus },

    #[error("Idempotency key {0:?} was already used with different parameters")]
    IdempotencyConflict(String),

    // Business rules
    #[error("Insufficient funds on account {account_id}: balance {balance}, requested {requested}, overdraft limit {overdraft_limit}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: i64,
        requested: i64,
        overdraft_limit: i64,
    },

    #[error("Account {account_id} is not active ({status})")]
    AccountNotActive {
        account_id: AccountId,
        status: AccountStatus,
    },

    #[error("Journal entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("Journal entry {0} is not posted")]
    EntryNotPosted(EntryId),

    #[error("Journal entry {0} is already reversed")]
    EntryAlreadyReversed(EntryId),

    #[error("Transfer not found: {0}")]
    TransferNotFound(TransferId),

    // Transient
    #[error("Storage timeout: lock acquisition or commit took too long")]
    StorageTimeout,

    #[error("Concurrent modification conflict, retries exhausted")]
    Conflict,

    // Fatal
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_)
            | Self::SameAccount
            | Self::CurrencyMismatch { .. }
            | Self::UnbalancedEntry { .. }
            | Self::TooFewLines(_)
            | Self::InvalidCurrency(_)
            | Self::Overflow
            | Self::AccountNotFound(_)
            | Self::InvalidStatusTransition { .. }
            | Self::IdempotencyConflict(_) => ErrorKind::Validation,

            Self::InsufficientFunds { .. }
            | Self::AccountNotActive { .. }
            | Self::EntryNotFound(_)
            | Self::EntryNotPosted(_)
            | Self::EntryAlreadyReversed(_)
            | Self::TransferNotFound(_) => ErrorKind::Business,

            Self::StorageTimeout | Self::Conflict => ErrorKind::Transient,

            Self::InvariantViolation(_) => ErrorKind::Invariant,

            Self::Storage(_) => ErrorKind::Infrastructure,
        }
    }

    /// Check if this is a client error (caller's fault or business outcome)
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::Business)
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Reason recorded on a FAILED transfer, for errors that fail a transfer
    /// rather than abort the request.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        let reason = match self {
            Self::InvalidAmount(_) => FailureReason::InvalidAmount,
            Self::SameAccount => FailureReason::SameAccount,
            Self::CurrencyMismatch { .. } => FailureReason::CurrencyMismatch,
            Self::UnbalancedEntry { .. } => FailureReason::UnbalancedEntry,
            Self::Overflow => FailureReason::Overflow,
            Self::AccountNotFound(_) => FailureReason::AccountNotFound,
            Self::InsufficientFunds { .. } => FailureReason::InsufficientFunds,
            Self::AccountNotActive { .. } => FailureReason::AccountNotActive,
            _ => return None,
        };
        Some(reason)
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(invariant = %message, "Ledger invariant violated");
        Self::InvariantViolation(message)
    }
}

impl From<MoneyError> for LedgerError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::CurrencyMismatch { expected, found } => {
                LedgerError::CurrencyMismatch { expected, found }
            }
            MoneyError::Overflow => LedgerError::Overflow,
            MoneyError::InvalidCurrency(code) => LedgerError::InvalidCurrency(code),
        }
    }
}

/// Why a transfer ended up FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    SameAccount,
    InvalidAmount,
    CurrencyMismatch,
    UnbalancedEntry,
    Overflow,
    AccountNotFound,
    InsufficientFunds,
    AccountNotActive,
    /// Transient storage failure on a transfer sent without an idempotency
    /// key; nothing could resume it.
    StorageUnavailable,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::SameAccount => "SameAccount",
            FailureReason::InvalidAmount => "InvalidAmount",
            FailureReason::CurrencyMismatch => "CurrencyMismatch",
            FailureReason::UnbalancedEntry => "UnbalancedEntry",
            FailureReason::Overflow => "Overflow",
            FailureReason::AccountNotFound => "AccountNotFound",
            FailureReason::InsufficientFunds => "InsufficientFunds",
            FailureReason::AccountNotActive => "AccountNotActive",
            FailureReason::StorageUnavailable => "StorageUnavailable",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reason = match s {
            "SameAccount" => FailureReason::SameAccount,
            "InvalidAmount" => FailureReason::InvalidAmount,
            "CurrencyMismatch" => FailureReason::CurrencyMismatch,
            "UnbalancedEntry" => FailureReason::UnbalancedEntry,
            "Overflow" => FailureReason::Overflow,
            "AccountNotFound" => FailureReason::AccountNotFound,
            "InsufficientFunds" => FailureReason::InsufficientFunds,
            "AccountNotActive" => FailureReason::AccountNotActive,
            "StorageUnavailable" => FailureReason::StorageUnavailable,
            other => {
                return Err(LedgerError::Storage(format!("unknown failure reason {other:?}")))
            }
        };
        Ok(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_error() {
        let err = LedgerError::InsufficientFunds {
            account_id: AccountId::new(),
            balance: 1000,
            requested: 1500,
            overdraft_limit: 0,
        };

        assert_eq!(err.kind(), ErrorKind::Business);
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
        assert_eq!(err.failure_reason(), Some(FailureReason::InsufficientFunds));
        assert!(err.to_string().contains("1500"));
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(LedgerError::StorageTimeout.is_retryable());
        assert!(LedgerError::Conflict.is_retryable());
        assert_eq!(LedgerError::StorageTimeout.failure_reason(), None);
    }

    #[test]
    fn test_reversal_errors_do_not_fail_transfers() {
        let id = EntryId::new();
        assert_eq!(LedgerError::EntryAlreadyReversed(id).failure_reason(), None);
        assert_eq!(LedgerError::EntryNotPosted(id).kind(), ErrorKind::Business);
    }

    #[test]
    fn test_money_error_conversion() {
        let err: LedgerError = MoneyError::CurrencyMismatch {
            expected: Currency::USD,
            found: Currency::EUR,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.failure_reason(), Some(FailureReason::CurrencyMismatch));
    }

    #[test]
    fn test_failure_reason_roundtrip() {
        for reason in [
            FailureReason::SameAccount,
            FailureReason::InsufficientFunds,
            FailureReason::AccountNotActive,
        ] {
            assert_eq!(reason.as_str().parse::<FailureReason>().unwrap(), reason);
        }
        assert_eq!(
            serde_json::to_string(&FailureReason::InsufficientFunds).unwrap(),
            "\"InsufficientFunds\""
        );
    }
}
