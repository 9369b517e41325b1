//! Ledger module
//!
//! The ledger engine: account ledger, journal store, transfer orchestrator,
//! and the [`LedgerEngine`] facade that callers use.

pub mod account_ledger;
mod commands;
pub mod journal;
pub mod transfer;

use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{
    Account, AccountId, AccountStatus, Clock, Currency, EntryId, JournalEntry, JournalEntryLine,
    LedgerError, Money, SystemClock, Transfer, TransferId,
};
use crate::store::{LedgerStore, LedgerTransaction};

pub use commands::*;
pub use journal::JournalStore;
pub use transfer::TransferOrchestrator;

/// Retry policy for store conflicts
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fresh attempts after the first one fails with a conflict
    pub max_retries: u32,
    /// Linear backoff step: attempt `n` waits `n * retry_backoff`
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// Run `attempt` until it succeeds, fails with something other than
/// `Conflict`, or the retry budget is spent.
pub(crate) async fn retry_on_conflict<T, F, Fut>(
    config: &EngineConfig,
    operation: &str,
    mut attempt: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut retries = 0u32;
    loop {
        match attempt().await {
            Err(LedgerError::Conflict) if retries < config.max_retries => {
                retries += 1;
                tracing::warn!(
                    operation,
                    "Concurrency conflict, retrying (attempt {}/{})",
                    retries,
                    config.max_retries
                );
                tokio::time::sleep(config.retry_backoff * retries).await;
            }
            other => return other,
        }
    }
}

/// Facade over the ledger components for one store
pub struct LedgerEngine<S> {
    store: Arc<S>,
    journal: JournalStore<S>,
    transfers: TransferOrchestrator<S>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S> Clone for LedgerEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            journal: self.journal.clone(),
            transfers: self.transfers.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, EngineConfig::default(), Arc::new(SystemClock))
    }

    pub fn with_config(store: S, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(store);
        let journal = JournalStore::new(store.clone(), clock.clone(), config.clone());
        let transfers = TransferOrchestrator::new(store.clone(), journal.clone(), clock.clone());

        Self {
            store,
            journal,
            transfers,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    pub async fn request_transfer(&self, command: TransferCommand) -> Result<Transfer, LedgerError> {
        self.transfers.request_transfer(command).await
    }

    pub async fn transfer(&self, id: TransferId) -> Result<Transfer, LedgerError> {
        self.transfers.transfer(id).await
    }

    // =========================================================================
    // Journal
    // =========================================================================

    pub async fn post_entry(&self, command: PostEntryCommand) -> Result<JournalEntry, LedgerError> {
        self.journal.post_entry(&command).await
    }

    pub async fn reverse_entry(&self, entry_id: EntryId) -> Result<JournalEntry, LedgerError> {
        self.journal.reverse_entry(entry_id).await
    }

    pub async fn entry(&self, entry_id: EntryId) -> Result<JournalEntry, LedgerError> {
        self.journal.entry(entry_id).await
    }

    pub async fn list_lines(
        &self,
        account_id: AccountId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<JournalEntryLine>, LedgerError> {
        self.journal.list_lines(account_id, from, to).await
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Committed balance; never reflects in-flight work
    pub async fn get_balance(&self, account_id: AccountId) -> Result<Money, LedgerError> {
        Ok(self.account(account_id).await?.balance())
    }

    pub async fn account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        self.store
            .account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Open an account with zero balance. Money arrives only through entries.
    pub async fn open_account(&self, command: OpenAccountCommand) -> Result<Account, LedgerError> {
        let now = self.clock.now();
        let id = command.account_id.unwrap_or_default();

        let mut account = Account::open(
            id,
            command.holder_id,
            command.currency,
            command.overdraft_limit_minor,
            now,
        )?;
        if command.activate {
            account = account.transition(AccountStatus::Active, now)?;
        }

        self.store.insert_account(&account).await?;

        tracing::info!(
            account_id = %account.id(),
            holder_id = %account.holder_id(),
            currency = %account.currency(),
            status = %account.status(),
            "Account opened"
        );
        Ok(account)
    }

    /// Get or create the internal account owned by the system holder
    pub async fn ensure_system_account(
        &self,
        account_id: AccountId,
        currency: Currency,
    ) -> Result<Account, LedgerError> {
        if let Some(existing) = self.store.account(account_id).await? {
            if !existing.is_system() || existing.currency() != currency {
                return Err(LedgerError::invariant(format!(
                    "account {account_id} exists but is not a {currency} system account"
                )));
            }
            return Ok(existing);
        }

        let account = Account::system(account_id, currency, self.clock.now());
        self.store.insert_account(&account).await?;
        tracing::info!(account_id = %account_id, currency = %currency, "System account created");
        Ok(account)
    }

    /// Move an account along its lifecycle under the account lock
    pub async fn change_account_status(
        &self,
        account_id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, LedgerError> {
        let account = retry_on_conflict(&self.config, "change_account_status", || {
            self.try_change_status(account_id, status)
        })
        .await?;

        tracing::info!(account_id = %account_id, status = %status, "Account status changed");
        Ok(account)
    }

    async fn try_change_status(
        &self,
        account_id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, LedgerError> {
        let now = self.clock.now();
        let mut tx = self.store.begin(&[account_id]).await?;

        let next = tx
            .account(account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?
            .transition(status, now)?;

        tx.update_account_status(account_id, status, now).await?;
        tx.commit().await?;
        Ok(next)
    }
}
