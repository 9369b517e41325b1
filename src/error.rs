//! Error handling module
//!
//! HTTP-facing error type and its response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{ErrorKind, LedgerError};

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Whether the same request (same idempotency key) may succeed later
    pub retryable: bool,
}

/// Status and machine-readable code for a ledger error
fn ledger_status(err: &LedgerError) -> (StatusCode, &'static str) {
    match err {
        LedgerError::AccountNotFound(_) => (StatusCode::NOT_FOUND, "account_not_found"),
        LedgerError::EntryNotFound(_) => (StatusCode::NOT_FOUND, "entry_not_found"),
        LedgerError::TransferNotFound(_) => (StatusCode::NOT_FOUND, "transfer_not_found"),
        LedgerError::IdempotencyConflict(_) => (StatusCode::CONFLICT, "idempotency_conflict"),

        LedgerError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
        LedgerError::SameAccount => (StatusCode::BAD_REQUEST, "same_account"),
        LedgerError::CurrencyMismatch { .. } => (StatusCode::BAD_REQUEST, "currency_mismatch"),
        LedgerError::UnbalancedEntry { .. } => (StatusCode::BAD_REQUEST, "unbalanced_entry"),
        LedgerError::TooFewLines(_) => (StatusCode::BAD_REQUEST, "too_few_lines"),
        LedgerError::InvalidCurrency(_) => (StatusCode::BAD_REQUEST, "invalid_currency"),
        LedgerError::Overflow => (StatusCode::BAD_REQUEST, "amount_overflow"),
        LedgerError::InvalidStatusTransition { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_status_transition")
        }

        LedgerError::InsufficientFunds { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds")
        }
        LedgerError::AccountNotActive { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "account_not_active")
        }
        LedgerError::EntryNotPosted(_) => (StatusCode::UNPROCESSABLE_ENTITY, "entry_not_posted"),
        LedgerError::EntryAlreadyReversed(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "entry_already_reversed")
        }

        LedgerError::StorageTimeout => (StatusCode::SERVICE_UNAVAILABLE, "storage_timeout"),
        LedgerError::Conflict => (StatusCode::SERVICE_UNAVAILABLE, "concurrency_conflict"),

        LedgerError::InvariantViolation(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "invariant_violation")
        }
        LedgerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details, retryable) = match &self {
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()), false)
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()), false)
            }
            AppError::Ledger(err) => {
                let (status, code) = ledger_status(err);
                match err.kind() {
                    ErrorKind::Invariant | ErrorKind::Infrastructure => {
                        tracing::error!("Ledger error: {}", err);
                    }
                    ErrorKind::Transient => {
                        tracing::warn!("Transient ledger error: {}", err);
                    }
                    ErrorKind::Validation | ErrorKind::Business => {}
                }
                (status, code, None, err.is_retryable())
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None, false)
            }
        };

        // Internal detail stays in the logs
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
            retryable,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountId, AccountStatus, EntryId};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (LedgerError::SameAccount, StatusCode::BAD_REQUEST),
            (LedgerError::AccountNotFound(AccountId::new()), StatusCode::NOT_FOUND),
            (
                LedgerError::AccountNotActive {
                    account_id: AccountId::new(),
                    status: AccountStatus::Closed,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                LedgerError::EntryAlreadyReversed(EntryId::new()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (LedgerError::IdempotencyConflict("k".into()), StatusCode::CONFLICT),
            (LedgerError::StorageTimeout, StatusCode::SERVICE_UNAVAILABLE),
            (LedgerError::Storage("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err.clone()).into_response();
            assert_eq!(response.status(), expected, "{err:?}");
        }
    }
}
