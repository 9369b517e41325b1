//! In-memory ledger store
//!
//! Per-account exclusive locks (`tokio::sync::Mutex`) acquired in ascending id
//! order, writes staged in the transaction and applied in one step at commit.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{
    Account, AccountId, AccountStatus, EntryId, EntryStatus, JournalEntry, JournalEntryLine,
    Transfer, TransferId, TransferStatus,
};

use super::{InsertOutcome, LedgerStore, LedgerTransaction, StoreError};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Committed state
#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    entries: HashMap<EntryId, JournalEntry>,
    /// All lines in commit order
    lines: Vec<JournalEntryLine>,
    transfers: HashMap<TransferId, Transfer>,
    transfer_keys: HashMap<String, TransferId>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    account_locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
    lock_timeout: Duration,
}

/// Ledger store kept in process memory
#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    inner: Arc<Inner>,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                account_locks: Mutex::new(HashMap::new()),
                lock_timeout,
            }),
        }
    }

    /// Lock handle for an existing account. Unknown ids get none, so the
    /// lock table only ever holds one mutex per stored account.
    async fn account_lock(&self, id: AccountId) -> Option<Arc<Mutex<()>>> {
        if !self.inner.state.lock().await.accounts.contains_key(&id) {
            return None;
        }
        let mut locks = self.inner.account_locks.lock().await;
        Some(locks.entry(id).or_default().clone())
    }

    /// Number of committed journal entries (for diagnostics and tests)
    pub async fn entry_count(&self) -> usize {
        self.inner.state.lock().await.entries.len()
    }

    /// Every stored transfer, in no particular order
    pub async fn transfers_snapshot(&self) -> Vec<Transfer> {
        self.inner.state.lock().await.transfers.values().cloned().collect()
    }

    /// Number of committed journal lines
    pub async fn line_count(&self) -> usize {
        self.inner.state.lock().await.lines.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryTransaction;

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.state.lock().await.accounts.get(&id).cloned())
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock().await;
        if state.accounts.contains_key(&account.id()) {
            return Err(StoreError::Duplicate(format!("account {}", account.id())));
        }
        state.accounts.insert(account.id(), account.clone());
        Ok(())
    }

    async fn entry(&self, id: EntryId) -> Result<Option<JournalEntry>, StoreError> {
        Ok(self.inner.state.lock().await.entries.get(&id).cloned())
    }

    async fn lines_for_account(
        &self,
        account_id: AccountId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<JournalEntryLine>, StoreError> {
        let state = self.inner.state.lock().await;
        let lines = state
            .lines
            .iter()
            .rev()
            .filter(|line| line.account_id == account_id)
            .filter(|line| from.map_or(true, |from| line.booking_date >= from))
            .filter(|line| to.map_or(true, |to| line.booking_date <= to))
            .cloned()
            .collect();
        Ok(lines)
    }

    async fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(self.inner.state.lock().await.transfers.get(&id).cloned())
    }

    async fn transfer_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transfer>, StoreError> {
        let state = self.inner.state.lock().await;
        Ok(state
            .transfer_keys
            .get(key)
            .and_then(|id| state.transfers.get(id))
            .cloned())
    }

    async fn insert_transfer(&self, transfer: &Transfer) -> Result<InsertOutcome, StoreError> {
        let mut state = self.inner.state.lock().await;

        if let Some(key) = &transfer.idempotency_key {
            if let Some(existing) = state.transfer_keys.get(key).and_then(|id| state.transfers.get(id)) {
                return Ok(InsertOutcome::Existing(existing.clone()));
            }
            state.transfer_keys.insert(key.clone(), transfer.id);
        }

        state.transfers.insert(transfer.id, transfer.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn fail_transfer(&self, transfer: &Transfer) -> Result<bool, StoreError> {
        let mut state = self.inner.state.lock().await;
        match state.transfers.get_mut(&transfer.id) {
            Some(stored) if stored.status == TransferStatus::Pending => {
                *stored = transfer.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn begin(&self, accounts: &[AccountId]) -> Result<Self::Tx, StoreError> {
        let mut guards = Vec::with_capacity(accounts.len());
        let mut locked = Vec::with_capacity(accounts.len());
        for id in accounts {
            let Some(lock) = self.account_lock(*id).await else {
                continue;
            };
            let guard = tokio::time::timeout(self.inner.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    tracing::warn!(account_id = %id, "Timed out waiting for account lock");
                    StoreError::Timeout
                })?;
            guards.push(guard);
            locked.push(*id);
        }

        // Accounts opened after the existence check stay out of the snapshot.
        let state = self.inner.state.lock().await;
        let snapshot = locked
            .iter()
            .filter_map(|id| state.accounts.get(id).map(|account| (*id, account.clone())))
            .collect();

        Ok(InMemoryTransaction {
            inner: self.inner.clone(),
            _guards: guards,
            accounts: snapshot,
            staged: Staged::default(),
        })
    }
}

/// Writes held back until commit
#[derive(Debug, Default)]
struct Staged {
    entries: Vec<JournalEntry>,
    balances: HashMap<AccountId, (i64, DateTime<Utc>)>,
    statuses: HashMap<AccountId, (AccountStatus, DateTime<Utc>)>,
    entry_transitions: Vec<(EntryId, EntryStatus, EntryStatus)>,
    executed_transfer: Option<Transfer>,
}

/// Transaction over [`InMemoryLedgerStore`]; releases its account locks on drop
#[derive(Debug)]
pub struct InMemoryTransaction {
    inner: Arc<Inner>,
    _guards: Vec<OwnedMutexGuard<()>>,
    accounts: HashMap<AccountId, Account>,
    staged: Staged,
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    async fn entry_status_for_update(
        &mut self,
        id: EntryId,
    ) -> Result<Option<EntryStatus>, StoreError> {
        if let Some(entry) = self.staged.entries.iter().find(|entry| entry.id == id) {
            return Ok(Some(entry.status));
        }
        if let Some((_, _, to)) = self.staged.entry_transitions.iter().rev().find(|(entry_id, _, _)| *entry_id == id) {
            return Ok(Some(*to));
        }

        let state = self.inner.state.lock().await;
        Ok(state.entries.get(&id).map(|entry| entry.status))
    }

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), StoreError> {
        if self.staged.entries.iter().any(|staged| staged.id == entry.id) {
            return Err(StoreError::Duplicate(format!("journal entry {}", entry.id)));
        }
        self.staged.entries.push(entry.clone());
        Ok(())
    }

    async fn update_balance(
        &mut self,
        account_id: AccountId,
        balance_minor: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| StoreError::Corrupt(format!("account {account_id} is not locked")))?;
        *account = account.with_balance(balance_minor, at);
        self.staged.balances.insert(account_id, (balance_minor, at));
        Ok(())
    }

    async fn update_account_status(
        &mut self,
        account_id: AccountId,
        status: AccountStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| StoreError::Corrupt(format!("account {account_id} is not locked")))?;
        *account = Account::from_db_state(
            account.id(),
            account.holder_id(),
            account.currency(),
            account.balance_minor(),
            account.overdraft_limit_minor(),
            status,
            account.created_at(),
            at,
        );
        self.staged.statuses.insert(account_id, (status, at));
        Ok(())
    }

    async fn transition_entry(
        &mut self,
        id: EntryId,
        from: EntryStatus,
        to: EntryStatus,
    ) -> Result<bool, StoreError> {
        if let Some(entry) = self.staged.entries.iter_mut().find(|entry| entry.id == id) {
            if entry.status != from {
                return Ok(false);
            }
            entry.status = to;
            return Ok(true);
        }

        if self.entry_status_for_update(id).await? != Some(from) {
            return Ok(false);
        }
        self.staged.entry_transitions.push((id, from, to));
        Ok(true)
    }

    async fn execute_transfer(&mut self, transfer: &Transfer) -> Result<bool, StoreError> {
        let pending = {
            let state = self.inner.state.lock().await;
            state
                .transfers
                .get(&transfer.id)
                .map_or(false, |stored| stored.status == TransferStatus::Pending)
        };
        if !pending {
            return Ok(false);
        }
        self.staged.executed_transfer = Some(transfer.clone());
        Ok(true)
    }

    async fn commit(self) -> Result<(), StoreError> {
        let InMemoryTransaction {
            inner,
            _guards,
            staged,
            ..
        } = self;
        let mut state = inner.state.lock().await;

        // Re-check compare-and-set preconditions; nothing is applied if one fails
        for (id, from, _) in &staged.entry_transitions {
            let current = state.entries.get(id).map(|entry| entry.status);
            if current != Some(*from) {
                return Err(StoreError::Conflict(format!(
                    "journal entry {id} changed status concurrently"
                )));
            }
        }
        if let Some(transfer) = &staged.executed_transfer {
            let still_pending = state
                .transfers
                .get(&transfer.id)
                .map_or(false, |stored| stored.status == TransferStatus::Pending);
            if !still_pending {
                return Err(StoreError::Conflict(format!(
                    "transfer {} was finalized concurrently",
                    transfer.id
                )));
            }
        }

        for (account_id, (balance_minor, at)) in staged.balances {
            if let Some(account) = state.accounts.get_mut(&account_id) {
                *account = account.with_balance(balance_minor, at);
            }
        }
        for (account_id, (status, at)) in staged.statuses {
            if let Some(account) = state.accounts.get_mut(&account_id) {
                *account = Account::from_db_state(
                    account.id(),
                    account.holder_id(),
                    account.currency(),
                    account.balance_minor(),
                    account.overdraft_limit_minor(),
                    status,
                    account.created_at(),
                    at,
                );
            }
        }
        for entry in staged.entries {
            state.lines.extend(entry.lines.iter().cloned());
            state.entries.insert(entry.id, entry);
        }
        for (id, _, to) in staged.entry_transitions {
            if let Some(entry) = state.entries.get_mut(&id) {
                entry.status = to;
            }
        }
        if let Some(transfer) = staged.executed_transfer {
            state.transfers.insert(transfer.id, transfer);
        }

        drop(state);
        drop(_guards);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Currency, HolderId};
    use crate::store::lock_order;

    async fn store_with_active_account() -> (InMemoryLedgerStore, AccountId) {
        let store = InMemoryLedgerStore::new();
        let now = Utc::now();
        let account = Account::open(AccountId::new(), HolderId::new(), Currency::USD, 0, now)
            .unwrap()
            .transition(AccountStatus::Active, now)
            .unwrap();
        store.insert_account(&account).await.unwrap();
        (store, account.id())
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let (store, id) = store_with_active_account().await;

        {
            let mut tx = store.begin(&[id]).await.unwrap();
            tx.update_balance(id, 500, Utc::now()).await.unwrap();
            assert_eq!(tx.account(id).unwrap().balance_minor(), 500);
        }

        let account = store.account(id).await.unwrap().unwrap();
        assert_eq!(account.balance_minor(), 0);
    }

    #[tokio::test]
    async fn test_commit_applies_balance() {
        let (store, id) = store_with_active_account().await;

        let mut tx = store.begin(&[id]).await.unwrap();
        tx.update_balance(id, 500, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let account = store.account(id).await.unwrap().unwrap();
        assert_eq!(account.balance_minor(), 500);
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let store = InMemoryLedgerStore::with_lock_timeout(Duration::from_millis(20));
        let now = Utc::now();
        let account = Account::open(AccountId::new(), HolderId::new(), Currency::USD, 0, now).unwrap();
        store.insert_account(&account).await.unwrap();
        let id = account.id();

        let _held = store.begin(&lock_order([id])).await.unwrap();
        let second = store.begin(&[id]).await;
        assert!(matches!(second, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn test_missing_account_absent_from_snapshot() {
        let store = InMemoryLedgerStore::new();
        let id = AccountId::new();
        let tx = store.begin(&[id]).await.unwrap();
        assert!(tx.account(id).is_none());
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_lock_behind() {
        let (store, id) = store_with_active_account().await;

        for _ in 0..1_000 {
            let tx = store.begin(&[AccountId::new()]).await.unwrap();
            drop(tx);
        }
        let tx = store.begin(&lock_order([id, AccountId::new()])).await.unwrap();
        assert!(tx.account(id).is_some());
        drop(tx);

        let locks = store.inner.account_locks.lock().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key(&id));
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let (store, id) = store_with_active_account().await;
        let account = store.account(id).await.unwrap().unwrap();
        assert!(matches!(
            store.insert_account(&account).await,
            Err(StoreError::Duplicate(_))
        ));
    }
}
