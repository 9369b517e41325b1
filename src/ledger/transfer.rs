//! Transfer Orchestrator
//!
//! Drives a transfer from PENDING to EXECUTED or FAILED. The financial effect
//! is one TRANSFER journal entry (`DEBIT from`, `CREDIT to`), committed in the
//! same store transaction as the EXECUTED status.

use std::sync::Arc;

use crate::domain::{Clock, FailureReason, LedgerError, Transfer, TransferId, TransferStatus};
use crate::idempotency;
use crate::store::{InsertOutcome, LedgerStore};

use super::commands::{PostEntryCommand, TransferCommand};
use super::journal::{JournalStore, Posting};

/// Rejections decided before any entry is attempted
fn precheck(transfer: &Transfer) -> Result<(), LedgerError> {
    if transfer.from_account_id == transfer.to_account_id {
        return Err(LedgerError::SameAccount);
    }
    if transfer.amount_minor <= 0 {
        return Err(LedgerError::InvalidAmount(format!(
            "transfer amount must be > 0 (got {})",
            transfer.amount_minor
        )));
    }
    Ok(())
}

pub struct TransferOrchestrator<S> {
    store: Arc<S>,
    journal: JournalStore<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for TransferOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            journal: self.journal.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: LedgerStore> TransferOrchestrator<S> {
    pub fn new(store: Arc<S>, journal: JournalStore<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            journal,
            clock,
        }
    }

    /// Execute a transfer request.
    ///
    /// Business and validation failures are recorded on the returned transfer
    /// (`FAILED` with a `failure_reason`). Transient failures are returned as
    /// errors and leave the transfer PENDING; repeating the request with the
    /// same idempotency key resumes it.
    pub async fn request_transfer(&self, command: TransferCommand) -> Result<Transfer, LedgerError> {
        let request_hash = idempotency::request_hash(&command);

        if let Some(key) = &command.idempotency_key {
            if let Some(existing) = self.store.transfer_by_idempotency_key(key).await? {
                return self.resume(existing, &request_hash).await;
            }
        }

        let transfer = Transfer {
            id: TransferId::new(),
            from_account_id: command.from_account_id,
            to_account_id: command.to_account_id,
            amount_minor: command.amount_minor,
            currency: command.currency,
            status: TransferStatus::Pending,
            failure_reason: None,
            journal_entry_id: None,
            description: command.description,
            idempotency_key: command.idempotency_key,
            request_hash,
            requested_at: self.clock.now(),
            executed_at: None,
        };

        match self.store.insert_transfer(&transfer).await? {
            InsertOutcome::Inserted => {}
            InsertOutcome::Existing(existing) => {
                return self.resume(existing, &transfer.request_hash).await;
            }
        }

        tracing::info!(
            transfer_id = %transfer.id,
            from = %transfer.from_account_id,
            to = %transfer.to_account_id,
            amount = transfer.amount_minor,
            currency = %transfer.currency,
            "Transfer requested"
        );

        self.execute(transfer).await
    }

    pub async fn transfer(&self, id: TransferId) -> Result<Transfer, LedgerError> {
        self.store
            .transfer(id)
            .await?
            .ok_or(LedgerError::TransferNotFound(id))
    }

    /// Replay of a known idempotency key
    async fn resume(&self, existing: Transfer, request_hash: &str) -> Result<Transfer, LedgerError> {
        idempotency::ensure_same_request(&existing, request_hash)?;

        if existing.is_terminal() {
            tracing::debug!(
                transfer_id = %existing.id,
                status = %existing.status,
                "Idempotent replay, returning stored transfer"
            );
            return Ok(existing);
        }

        tracing::info!(transfer_id = %existing.id, "Resuming pending transfer");
        self.execute(existing).await
    }

    async fn execute(&self, transfer: Transfer) -> Result<Transfer, LedgerError> {
        if let Err(err) = precheck(&transfer) {
            return self.fail(transfer, err).await;
        }

        let mut command = PostEntryCommand::transfer(
            transfer.from_account_id,
            transfer.to_account_id,
            transfer.amount(),
        )
        .with_external_reference(transfer.id.to_string());
        if let Some(description) = &transfer.description {
            command = command.with_description(description.clone());
        }

        match self.journal.post_for_transfer(&command, &transfer).await {
            Ok(Posting::Committed {
                transfer: Some(executed),
                entry,
            }) => {
                tracing::info!(
                    transfer_id = %executed.id,
                    entry_id = %entry.id,
                    "Transfer executed"
                );
                Ok(executed)
            }
            Ok(Posting::Committed { transfer: None, entry }) => Err(LedgerError::invariant(format!(
                "entry {} committed without finalizing transfer {}",
                entry.id, transfer.id
            ))),
            Ok(Posting::TransferNotPending) => self.transfer(transfer.id).await,
            Err(err) if err.failure_reason().is_some() => self.fail(transfer, err).await,
            Err(err) if err.is_retryable() && transfer.idempotency_key.is_none() => {
                self.abandon(transfer, err).await
            }
            Err(err) => {
                tracing::warn!(
                    transfer_id = %transfer.id,
                    error = %err,
                    retryable = err.is_retryable(),
                    "Transfer left pending"
                );
                Err(err)
            }
        }
    }

    /// PENDING -> FAILED. If the transfer was finalized concurrently the
    /// stored outcome wins.
    async fn fail(&self, transfer: Transfer, err: LedgerError) -> Result<Transfer, LedgerError> {
        let Some(reason) = err.failure_reason() else {
            return Err(err);
        };

        let failed = transfer.failed(reason);
        if self.store.fail_transfer(&failed).await? {
            tracing::info!(
                transfer_id = %failed.id,
                reason = %reason,
                error = %err,
                "Transfer failed"
            );
            return Ok(failed);
        }

        self.transfer(transfer.id).await
    }

    /// A keyless transfer cannot be replayed, so a transient failure closes it
    /// as FAILED. The caller still gets the retryable error and retries with
    /// a new transfer.
    async fn abandon(&self, transfer: Transfer, err: LedgerError) -> Result<Transfer, LedgerError> {
        let failed = transfer.failed(FailureReason::StorageUnavailable);
        match self.store.fail_transfer(&failed).await {
            Ok(true) => {
                tracing::warn!(transfer_id = %failed.id, error = %err, "Keyless transfer abandoned");
            }
            Ok(false) => {
                tracing::debug!(transfer_id = %failed.id, "Transfer finalized concurrently");
            }
            Err(store_err) => {
                tracing::warn!(
                    transfer_id = %failed.id,
                    error = %store_err,
                    "Could not record abandoned transfer, left pending"
                );
            }
        }
        Err(err)
    }
}
