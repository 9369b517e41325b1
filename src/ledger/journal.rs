//! Journal Store
//!
//! Creates journal entries and posts them atomically: lock accounts, insert
//! the entry as PENDING with its lines, apply each line through the account
//! ledger, move the entry to POSTED, commit. Also reverses posted entries.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use crate::domain::{
    AccountId, Clock, Currency, Direction, EntryId, EntryStatus, JournalEntry, JournalEntryLine,
    LedgerError, LineId, Transfer,
};
use crate::store::{lock_order, LedgerStore, LedgerTransaction};

use super::account_ledger;
use super::commands::PostEntryCommand;
use super::{retry_on_conflict, EngineConfig};

/// Outcome of one atomic posting
#[derive(Debug)]
pub(crate) enum Posting {
    Committed {
        entry: JournalEntry,
        /// The linked transfer, now EXECUTED
        transfer: Option<Transfer>,
    },
    /// The linked transfer was finalized by someone else; nothing was written
    TransferNotPending,
}

/// What a posting attempt must do besides writing the entry
#[derive(Debug, Clone, Copy, Default)]
struct Links<'a> {
    /// Original entry to move POSTED -> REVERSED
    reverses: Option<EntryId>,
    /// Transfer to move PENDING -> EXECUTED
    transfer: Option<&'a Transfer>,
}

/// Check a command without touching the store.
///
/// Returns the single currency of the entry.
pub fn validate(command: &PostEntryCommand) -> Result<Currency, LedgerError> {
    if command.lines.len() < 2 {
        return Err(LedgerError::TooFewLines(command.lines.len()));
    }

    let first = command.lines[0].amount;
    let mut debits = 0i64;
    let mut credits = 0i64;

    for line in &command.lines {
        if !line.amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "line amount must be > 0 (got {})",
                line.amount.amount_minor()
            )));
        }
        first.ensure_same_currency(&line.amount)?;

        let total = match line.direction {
            Direction::Debit => &mut debits,
            Direction::Credit => &mut credits,
        };
        *total = total
            .checked_add(line.amount.amount_minor())
            .ok_or(LedgerError::Overflow)?;
    }

    if debits != credits {
        return Err(LedgerError::UnbalancedEntry { debits, credits });
    }

    Ok(first.currency())
}

/// Materialize a PENDING entry from a validated command
fn build_entry(command: &PostEntryCommand, today: NaiveDate, now: DateTime<Utc>) -> JournalEntry {
    let id = EntryId::new();
    let booking_date = command.booking_date.unwrap_or(today);

    let lines = command
        .lines
        .iter()
        .map(|line| JournalEntryLine {
            id: LineId::new(),
            entry_id: id,
            account_id: line.account_id,
            direction: line.direction,
            amount: line.amount,
            value_date: line.value_date,
            description: line.description.clone(),
            booking_date,
            created_at: now,
        })
        .collect();

    JournalEntry {
        id,
        entry_type: command.entry_type,
        status: EntryStatus::Pending,
        booking_date,
        value_date: command.value_date,
        external_reference: command.external_reference.clone(),
        description: command.description.clone(),
        reverses: None,
        created_at: now,
        lines,
    }
}

/// Mirror of `original`: same type, every direction flipped
fn build_reversal(original: &JournalEntry, today: NaiveDate, now: DateTime<Utc>) -> JournalEntry {
    let id = EntryId::new();

    let lines = original
        .lines
        .iter()
        .map(|line| JournalEntryLine {
            id: LineId::new(),
            entry_id: id,
            account_id: line.account_id,
            direction: line.direction.flip(),
            amount: line.amount,
            value_date: None,
            description: line.description.clone(),
            booking_date: today,
            created_at: now,
        })
        .collect();

    JournalEntry {
        id,
        entry_type: original.entry_type,
        status: EntryStatus::Pending,
        booking_date: today,
        value_date: None,
        external_reference: Some(format!("REV-{}", original.id)),
        description: Some(format!("Reversal of {}", original.id)),
        reverses: Some(original.id),
        created_at: now,
        lines,
    }
}

fn ensure_reversible(id: EntryId, status: Option<EntryStatus>) -> Result<(), LedgerError> {
    match status {
        None => Err(LedgerError::EntryNotFound(id)),
        Some(EntryStatus::Pending) => Err(LedgerError::EntryNotPosted(id)),
        Some(EntryStatus::Reversed) => Err(LedgerError::EntryAlreadyReversed(id)),
        Some(EntryStatus::Posted) => Ok(()),
    }
}

/// Journal store over a [`LedgerStore`]
pub struct JournalStore<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S> Clone for JournalStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore> JournalStore<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self { store, clock, config }
    }

    /// Validate and post a balanced entry. On any error nothing is persisted.
    pub async fn post_entry(&self, command: &PostEntryCommand) -> Result<JournalEntry, LedgerError> {
        validate(command)?;
        let entry = build_entry(command, self.clock.today(), self.clock.now());

        let posting = retry_on_conflict(&self.config, "post_entry", || {
            self.try_post(&entry, Links::default())
        })
        .await?;

        match posting {
            Posting::Committed { entry, .. } => {
                tracing::info!(
                    entry_id = %entry.id,
                    entry_type = %entry.entry_type,
                    lines = entry.lines.len(),
                    "Journal entry posted"
                );
                Ok(entry)
            }
            Posting::TransferNotPending => Err(LedgerError::invariant(format!(
                "entry {} reported a transfer outcome without a transfer",
                entry.id
            ))),
        }
    }

    /// Post the entry of a PENDING transfer and mark the transfer EXECUTED in
    /// the same transaction.
    pub(crate) async fn post_for_transfer(
        &self,
        command: &PostEntryCommand,
        transfer: &Transfer,
    ) -> Result<Posting, LedgerError> {
        validate(command)?;
        let entry = build_entry(command, self.clock.today(), self.clock.now());

        let links = Links {
            reverses: None,
            transfer: Some(transfer),
        };
        retry_on_conflict(&self.config, "post_transfer", || self.try_post(&entry, links)).await
    }

    /// Post the mirror of a POSTED entry and mark the original REVERSED.
    ///
    /// Returns the reversing entry.
    pub async fn reverse_entry(&self, entry_id: EntryId) -> Result<JournalEntry, LedgerError> {
        let original = self
            .store
            .entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        ensure_reversible(entry_id, Some(original.status))?;

        let reversal = build_reversal(&original, self.clock.today(), self.clock.now());
        let links = Links {
            reverses: Some(entry_id),
            transfer: None,
        };

        match retry_on_conflict(&self.config, "reverse_entry", || self.try_post(&reversal, links)).await? {
            Posting::Committed { entry, .. } => {
                tracing::info!(
                    entry_id = %entry.id,
                    reverses = %entry_id,
                    "Journal entry reversed"
                );
                Ok(entry)
            }
            Posting::TransferNotPending => Err(LedgerError::invariant(format!(
                "reversal of {entry_id} reported a transfer outcome"
            ))),
        }
    }

    pub async fn entry(&self, entry_id: EntryId) -> Result<JournalEntry, LedgerError> {
        self.store
            .entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))
    }

    /// Lines of one account with a booking date in `[from, to]`, most recent first
    pub async fn list_lines(
        &self,
        account_id: AccountId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<JournalEntryLine>, LedgerError> {
        if self.store.account(account_id).await?.is_none() {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        Ok(self.store.lines_for_account(account_id, from, to).await?)
    }

    /// One attempt. Dropping `tx` on any early return rolls everything back.
    async fn try_post(&self, entry: &JournalEntry, links: Links<'_>) -> Result<Posting, LedgerError> {
        let now = self.clock.now();
        let accounts = lock_order(entry.account_ids());
        let mut tx = self.store.begin(&accounts).await?;

        // Lines reference accounts by foreign key; reject unknown ids before any row is written.
        if let Some(missing) = accounts.iter().find(|id| tx.account(**id).is_none()) {
            return Err(LedgerError::AccountNotFound(*missing));
        }

        if let Some(original) = links.reverses {
            ensure_reversible(original, tx.entry_status_for_update(original).await?)?;
        }

        tx.insert_entry(entry).await?;

        for line in &entry.lines {
            account_ledger::apply_line(&mut tx, line.account_id, line.direction, &line.amount, now)
                .await?;
        }

        for id in &accounts {
            if let Some(account) = tx.account(*id) {
                if !account.satisfies_floor() {
                    return Err(LedgerError::invariant(format!(
                        "account {id} below its floor before commit of entry {}",
                        entry.id
                    )));
                }
            }
        }

        if !tx
            .transition_entry(entry.id, EntryStatus::Pending, EntryStatus::Posted)
            .await?
        {
            return Err(LedgerError::invariant(format!(
                "entry {} was not PENDING inside its own transaction",
                entry.id
            )));
        }

        if let Some(original) = links.reverses {
            if !tx
                .transition_entry(original, EntryStatus::Posted, EntryStatus::Reversed)
                .await?
            {
                return Err(LedgerError::EntryAlreadyReversed(original));
            }
        }

        let executed = match links.transfer {
            Some(transfer) => {
                let executed = transfer.executed(entry.id, now);
                if !tx.execute_transfer(&executed).await? {
                    tracing::debug!(transfer_id = %transfer.id, "Transfer no longer pending, rolling back");
                    return Ok(Posting::TransferNotPending);
                }
                Some(executed)
            }
            None => None,
        };

        tx.commit().await?;

        let mut posted = entry.clone();
        posted.status = EntryStatus::Posted;
        Ok(Posting::Committed {
            entry: posted,
            transfer: executed,
        })
    }
}
