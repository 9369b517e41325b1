//! PostgreSQL ledger store
//!
//! Every ledger transaction runs at SERIALIZABLE isolation with a
//! transaction-local `lock_timeout`, and locks its account rows with
//! `SELECT ... FOR UPDATE ORDER BY id`. Schema: `migrations/001_ledger_schema.sql`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountStatus, Currency, Direction, EntryId, EntryStatus, EntryType,
    FailureReason, HolderId, JournalEntry, JournalEntryLine, LedgerError, LineId, Money,
    Transfer, TransferId, TransferStatus,
};

use super::{InsertOutcome, LedgerStore, LedgerTransaction, StoreError};

type AccountRow = (
    Uuid,
    Uuid,
    String,
    i64,
    i64,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

type EntryRow = (
    Uuid,
    String,
    String,
    NaiveDate,
    Option<NaiveDate>,
    Option<String>,
    Option<String>,
    Option<Uuid>,
    DateTime<Utc>,
);

type LineRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    i64,
    String,
    Option<NaiveDate>,
    Option<String>,
    NaiveDate,
    DateTime<Utc>,
);

type TransferRow = (
    Uuid,
    Uuid,
    Uuid,
    i64,
    String,
    String,
    Option<String>,
    Option<Uuid>,
    Option<String>,
    Option<String>,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

const ACCOUNT_COLUMNS: &str = "id, holder_id, currency, balance_minor, overdraft_limit_minor, \
                               status, created_at, updated_at";

const LINE_COLUMNS: &str = "id, entry_id, account_id, direction, amount_minor, currency, \
                            value_date, description, booking_date, created_at";

const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount_minor, currency, \
                                status, failure_reason, journal_entry_id, description, \
                                idempotency_key, request_hash, requested_at, executed_at";

// =========================================================================
// Row mapping
// =========================================================================

fn currency(code: &str) -> Result<Currency, StoreError> {
    Currency::new(code).map_err(|e| StoreError::from(LedgerError::from(e)))
}

fn account_from_row(row: AccountRow) -> Result<Account, StoreError> {
    let (id, holder_id, code, balance_minor, overdraft_limit_minor, status, created_at, updated_at) =
        row;
    Ok(Account::from_db_state(
        AccountId::from_uuid(id),
        HolderId::from_uuid(holder_id),
        currency(&code)?,
        balance_minor,
        overdraft_limit_minor,
        status.parse::<AccountStatus>()?,
        created_at,
        updated_at,
    ))
}

fn line_from_row(row: LineRow) -> Result<JournalEntryLine, StoreError> {
    let (
        id,
        entry_id,
        account_id,
        direction,
        amount_minor,
        code,
        value_date,
        description,
        booking_date,
        created_at,
    ) = row;
    Ok(JournalEntryLine {
        id: LineId::from_uuid(id),
        entry_id: EntryId::from_uuid(entry_id),
        account_id: AccountId::from_uuid(account_id),
        direction: direction.parse::<Direction>()?,
        amount: Money::new(amount_minor, currency(&code)?),
        value_date,
        description,
        booking_date,
        created_at,
    })
}

fn entry_from_row(row: EntryRow, lines: Vec<JournalEntryLine>) -> Result<JournalEntry, StoreError> {
    let (
        id,
        entry_type,
        status,
        booking_date,
        value_date,
        external_reference,
        description,
        reverses,
        created_at,
    ) = row;
    Ok(JournalEntry {
        id: EntryId::from_uuid(id),
        entry_type: entry_type.parse::<EntryType>()?,
        status: status.parse::<EntryStatus>()?,
        booking_date,
        value_date,
        external_reference,
        description,
        reverses: reverses.map(EntryId::from_uuid),
        created_at,
        lines,
    })
}

fn transfer_from_row(row: TransferRow) -> Result<Transfer, StoreError> {
    let (
        id,
        from_account_id,
        to_account_id,
        amount_minor,
        code,
        status,
        failure_reason,
        journal_entry_id,
        description,
        idempotency_key,
        request_hash,
        requested_at,
        executed_at,
    ) = row;
    Ok(Transfer {
        id: TransferId::from_uuid(id),
        from_account_id: AccountId::from_uuid(from_account_id),
        to_account_id: AccountId::from_uuid(to_account_id),
        amount_minor,
        currency: currency(&code)?,
        status: status.parse::<TransferStatus>()?,
        failure_reason: failure_reason
            .as_deref()
            .map(str::parse::<FailureReason>)
            .transpose()?,
        journal_entry_id: journal_entry_id.map(EntryId::from_uuid),
        description,
        idempotency_key,
        request_hash,
        requested_at,
        executed_at,
    })
}

// =========================================================================
// Store
// =========================================================================

/// Ledger store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgTransaction;

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        row.map(account_from_row).transpose()
    }

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, holder_id, currency, balance_minor, overdraft_limit_minor,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id().as_uuid())
        .bind(account.holder_id().as_uuid())
        .bind(account.currency().code())
        .bind(account.balance_minor())
        .bind(account.overdraft_limit_minor())
        .bind(account.status().as_str())
        .bind(account.created_at())
        .bind(account.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn entry(&self, id: EntryId) -> Result<Option<JournalEntry>, StoreError> {
        let row: Option<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, entry_type, status, booking_date, value_date,
                   external_reference, description, reverses, created_at
            FROM journal_entries
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let line_rows: Vec<LineRow> = sqlx::query_as(&format!(
            "SELECT {LINE_COLUMNS} FROM journal_entry_lines WHERE entry_id = $1 ORDER BY seq"
        ))
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let lines = line_rows
            .into_iter()
            .map(line_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        entry_from_row(row, lines).map(Some)
    }

    async fn lines_for_account(
        &self,
        account_id: AccountId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<JournalEntryLine>, StoreError> {
        let rows: Vec<LineRow> = sqlx::query_as(&format!(
            r#"
            SELECT {LINE_COLUMNS}
            FROM journal_entry_lines
            WHERE account_id = $1
              AND ($2::date IS NULL OR booking_date >= $2)
              AND ($3::date IS NULL OR booking_date <= $3)
            ORDER BY seq DESC
            "#
        ))
        .bind(account_id.as_uuid())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(line_from_row).collect()
    }

    async fn transfer(&self, id: TransferId) -> Result<Option<Transfer>, StoreError> {
        let row: Option<TransferRow> =
            sqlx::query_as(&format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        row.map(transfer_from_row).transpose()
    }

    async fn transfer_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transfer>, StoreError> {
        let row: Option<TransferRow> = sqlx::query_as(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(transfer_from_row).transpose()
    }

    async fn insert_transfer(&self, transfer: &Transfer) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transfers (
                id, from_account_id, to_account_id, amount_minor, currency,
                status, failure_reason, journal_entry_id, description,
                idempotency_key, request_hash, requested_at, executed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(transfer.id.as_uuid())
        .bind(transfer.from_account_id.as_uuid())
        .bind(transfer.to_account_id.as_uuid())
        .bind(transfer.amount_minor)
        .bind(transfer.currency.code())
        .bind(transfer.status.as_str())
        .bind(transfer.failure_reason.map(|reason| reason.as_str()))
        .bind(transfer.journal_entry_id.map(|id| id.as_uuid()))
        .bind(&transfer.description)
        .bind(&transfer.idempotency_key)
        .bind(&transfer.request_hash)
        .bind(transfer.requested_at)
        .bind(transfer.executed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(InsertOutcome::Inserted);
        }

        // Lost the race for the idempotency key
        let key = transfer.idempotency_key.as_deref().unwrap_or_default();
        match self.transfer_by_idempotency_key(key).await? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(StoreError::Conflict(format!(
                "idempotency key {key:?} vanished after insert conflict"
            ))),
        }
    }

    async fn fail_transfer(&self, transfer: &Transfer) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transfers
            SET status = 'FAILED', failure_reason = $2
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(transfer.id.as_uuid())
        .bind(transfer.failure_reason.map(|reason| reason.as_str()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn begin(&self, accounts: &[AccountId]) -> Result<Self::Tx, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        // SET does not take bind parameters; the value is an integer we format ourselves
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        let ids: Vec<Uuid> = accounts.iter().map(|id| id.as_uuid()).collect();
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let mut snapshot = HashMap::with_capacity(rows.len());
        for row in rows {
            let account = account_from_row(row)?;
            snapshot.insert(account.id(), account);
        }

        Ok(PgTransaction {
            tx,
            accounts: snapshot,
        })
    }
}

// =========================================================================
// Transaction
// =========================================================================

/// Open database transaction with its locked account rows.
/// Rolled back by sqlx if dropped before `commit`.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
    accounts: HashMap<AccountId, Account>,
}

#[async_trait]
impl LedgerTransaction for PgTransaction {
    fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    async fn entry_status_for_update(
        &mut self,
        id: EntryId,
    ) -> Result<Option<EntryStatus>, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM journal_entries WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(status.map(|s| s.parse::<EntryStatus>()).transpose()?)
    }

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO journal_entries (
                id, entry_type, status, booking_date, value_date,
                external_reference, description, reverses, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.entry_type.as_str())
        .bind(entry.status.as_str())
        .bind(entry.booking_date)
        .bind(entry.value_date)
        .bind(&entry.external_reference)
        .bind(&entry.description)
        .bind(entry.reverses.map(|id| id.as_uuid()))
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;

        for line in &entry.lines {
            sqlx::query(
                r#"
                INSERT INTO journal_entry_lines (
                    id, entry_id, account_id, direction, amount_minor, currency,
                    value_date, description, booking_date, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(line.entry_id.as_uuid())
            .bind(line.account_id.as_uuid())
            .bind(line.direction.as_str())
            .bind(line.amount.amount_minor())
            .bind(line.amount.currency().code())
            .bind(line.value_date)
            .bind(&line.description)
            .bind(line.booking_date)
            .bind(line.created_at)
            .execute(&mut *self.tx)
            .await?;
        }

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

        sqlx::query("UPDATE accounts SET balance_minor = $2, updated_at = $3 WHERE id = $1")
            .bind(account_id.as_uuid())
            .bind(balance_minor)
            .bind(at)
            .execute(&mut *self.tx)
            .await?;

        *account = account.with_balance(balance_minor, at);
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

        sqlx::query("UPDATE accounts SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(account_id.as_uuid())
            .bind(status.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .await?;

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
        Ok(())
    }

    async fn transition_entry(
        &mut self,
        id: EntryId,
        from: EntryStatus,
        to: EntryStatus,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE journal_entries SET status = $3 WHERE id = $1 AND status = $2")
                .bind(id.as_uuid())
                .bind(from.as_str())
                .bind(to.as_str())
                .execute(&mut *self.tx)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn execute_transfer(&mut self, transfer: &Transfer) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transfers
            SET status = 'EXECUTED', journal_entry_id = $2, executed_at = $3, failure_reason = NULL
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(transfer.id.as_uuid())
        .bind(transfer.journal_entry_id.map(|id| id.as_uuid()))
        .bind(transfer.executed_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
