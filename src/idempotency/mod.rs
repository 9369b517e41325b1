//! Idempotency module
//!
//! Transfer requests may carry a caller-chosen idempotency key. The key is
//! stored on the transfer together with a fingerprint of the request, so a
//! retry with the same key is recognized and a reuse with different
//! parameters is rejected.

use sha2::{Digest, Sha256};

use crate::domain::{LedgerError, Transfer};
use crate::ledger::TransferCommand;

/// SHA-256 fingerprint (hex) of the parameters that define a transfer.
///
/// The idempotency key itself is not part of the fingerprint.
pub fn request_hash(command: &TransferCommand) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.from_account_id.as_uuid().as_bytes());
    hasher.update(command.to_account_id.as_uuid().as_bytes());
    hasher.update(command.amount_minor.to_be_bytes());
    hasher.update(command.currency.code().as_bytes());
    match &command.description {
        Some(description) => {
            hasher.update([1u8]);
            hasher.update(description.as_bytes());
        }
        None => hasher.update([0u8]),
    }
    hex::encode(hasher.finalize())
}

/// Fail with `IdempotencyConflict` if `existing` was created from a different request
pub fn ensure_same_request(existing: &Transfer, request_hash: &str) -> Result<(), LedgerError> {
    if existing.request_hash != request_hash {
        let key = existing.idempotency_key.clone().unwrap_or_default();
        tracing::warn!(
            transfer_id = %existing.id,
            idempotency_key = %key,
            "Idempotency key reused with different parameters"
        );
        return Err(LedgerError::IdempotencyConflict(key));
    }
    Ok(())
}
