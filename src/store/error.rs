//! Store Errors
//!
//! Error types for storage backends.

use crate::domain::LedgerError;

/// Errors that can occur in a ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lock acquisition or commit did not finish in time
    #[error("Storage timeout")]
    Timeout,

    /// Serialization failure, deadlock or failed commit-time check
    #[error("Concurrent modification conflict: {0}")]
    Conflict(String),

    /// Unique constraint violation
    #[error("Duplicate row: {0}")]
    Duplicate(String),

    /// Foreign key points at a row that does not exist
    #[error("Missing referenced row: {0}")]
    MissingReference(String),

    /// Row could not be mapped back into a domain type
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Check if a fresh attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Timeout)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return StoreError::Timeout;
        }

        let code = match &err {
            sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
            _ => None,
        };

        match code.as_deref() {
            // serialization_failure, deadlock_detected
            Some("40001") | Some("40P01") => StoreError::Conflict(err.to_string()),
            // lock_not_available, query_canceled (statement/lock timeout)
            Some("55P03") | Some("57014") => StoreError::Timeout,
            Some("23505") => StoreError::Duplicate(err.to_string()),
            // foreign_key_violation
            Some("23503") => StoreError::MissingReference(err.to_string()),
            _ => StoreError::Database(err),
        }
    }
}

impl From<LedgerError> for StoreError {
    fn from(err: LedgerError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => LedgerError::StorageTimeout,
            StoreError::Conflict(_) => LedgerError::Conflict,
            StoreError::MissingReference(detail) => {
                LedgerError::invariant(format!("write referenced a missing row: {detail}"))
            }
            other => LedgerError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_is_retryable() {
        assert!(StoreError::Conflict("serialization failure".to_string()).is_retryable());
        assert!(StoreError::Timeout.is_retryable());
        assert!(!StoreError::Corrupt("bad status".to_string()).is_retryable());
    }

    #[test]
    fn test_pool_timeout_maps_to_storage_timeout() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Timeout));
        assert_eq!(LedgerError::from(err), LedgerError::StorageTimeout);
    }

    #[test]
    fn test_missing_reference_is_an_invariant_violation() {
        let err = LedgerError::from(StoreError::MissingReference(
            "journal_entry_lines_account_id_fkey".to_string(),
        ));
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
        assert!(!err.is_retryable());
        assert_eq!(err.failure_reason(), None);
    }

    #[test]
    fn test_conflict_maps_to_ledger_conflict() {
        let err = LedgerError::from(StoreError::Conflict("40001".to_string()));
        assert_eq!(err, LedgerError::Conflict);
        assert!(err.is_retryable());
    }
}
