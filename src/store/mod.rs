//! Store module
//!
//! Transactional storage the ledger engine is written against.
//! `InMemoryLedgerStore` serves tests and embedded use, `PgLedgerStore`
//! persists to PostgreSQL.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{
    Account, AccountId, AccountStatus, EntryId, EntryStatus, JournalEntry, JournalEntryLine,
    Transfer, TransferId,
};

pub use error::StoreError;
pub use memory::{InMemoryLedgerStore, InMemoryTransaction};
pub use postgres::{PgLedgerStore, PgTransaction};

/// Result of inserting a transfer that may carry an idempotency key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another transfer already holds the key
    Existing(Transfer),
}

/// Ascending, de-duplicated account ids.
///
/// Every code path that locks more than one account locks them in this order,
/// which rules out lock-order deadlocks between symmetric transfers.
pub fn lock_order(ids: impl IntoIterator<Item = AccountId>) -> Vec<AccountId> {
    let mut ids: Vec<AccountId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Snapshot reads and single-row writes outside of a ledger transaction,
/// plus the entry point to open one.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Tx: LedgerTransaction;

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    /// Entry with all its lines
    async fn entry(&self, id: EntryId) -> Result<Option<JournalEntry>, StoreError>;

    /// Committed lines of an account with a booking date in `[from, to]`,
    /// most recent first
    async fn lines_for_account(
        &self,
        account_id: AccountId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<JournalEntryLine>, StoreError>;

    async fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError>;

    async fn transfer_by_idempotency_key(&self, key: &str)
        -> Result<Option<Transfer>, StoreError>;

    async fn insert_transfer(&self, transfer: &Transfer) -> Result<InsertOutcome, StoreError>;

    /// PENDING -> FAILED compare-and-set. Returns false if the stored
    /// transfer is no longer PENDING.
    async fn fail_transfer(&self, transfer: &Transfer) -> Result<bool, StoreError>;

    /// Open a transaction holding exclusive locks on `accounts`.
    ///
    /// `accounts` must come from [`lock_order`]. Accounts that do not exist
    /// are simply absent from the snapshot.
    async fn begin(&self, accounts: &[AccountId]) -> Result<Self::Tx, StoreError>;
}

/// One atomic unit of ledger work.
///
/// Dropping the transaction without calling `commit` discards every write.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Locked account snapshot, reflecting writes made in this transaction
    fn account(&self, id: AccountId) -> Option<&Account>;

    async fn entry_status_for_update(
        &mut self,
        id: EntryId,
    ) -> Result<Option<EntryStatus>, StoreError>;

    /// Insert an entry and all of its lines
    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), StoreError>;

    async fn update_balance(
        &mut self,
        account_id: AccountId,
        balance_minor: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn update_account_status(
        &mut self,
        account_id: AccountId,
        status: AccountStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Compare-and-set on entry status. Returns false if the entry is not in `from`.
    async fn transition_entry(
        &mut self,
        id: EntryId,
        from: EntryStatus,
        to: EntryStatus,
    ) -> Result<bool, StoreError>;

    /// PENDING -> EXECUTED compare-and-set, committed with the entry
    async fn execute_transfer(&mut self, transfer: &Transfer) -> Result<bool, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_lock_order_sorts_and_dedups() {
        let a = AccountId::from_uuid(Uuid::from_u128(1));
        let b = AccountId::from_uuid(Uuid::from_u128(2));
        let c = AccountId::from_uuid(Uuid::from_u128(3));

        assert_eq!(lock_order([c, a, b, a]), vec![a, b, c]);
        assert_eq!(lock_order([b, a]), lock_order([a, b]));
    }
}
