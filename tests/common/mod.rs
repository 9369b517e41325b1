//! Common test utilities
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use core_ledger::domain::{
    AccountId, AccountStatus, Clock, Currency, FixedClock, HolderId, Money,
};
use core_ledger::ledger::{OpenAccountCommand, PostEntryCommand};
use core_ledger::{EngineConfig, InMemoryLedgerStore, LedgerEngine, LedgerStore};

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap()
}

pub fn usd(amount_minor: i64) -> Money {
    Money::new(amount_minor, Currency::USD)
}

/// Engine over a fresh store, a pinned clock, and a USD cash account
pub struct TestLedger<S: LedgerStore = InMemoryLedgerStore> {
    pub engine: Arc<LedgerEngine<S>>,
    pub clock: Arc<FixedClock>,
    pub cash: AccountId,
}

/// In-memory ledger with default retry policy
pub async fn setup() -> TestLedger {
    setup_with_lock_timeout(Duration::from_secs(5)).await
}

pub async fn setup_with_lock_timeout(lock_timeout: Duration) -> TestLedger {
    setup_with_store(InMemoryLedgerStore::with_lock_timeout(lock_timeout)).await
}

pub async fn setup_with_store<S: LedgerStore>(store: S) -> TestLedger<S> {
    let clock = Arc::new(FixedClock::new(start_time()));
    let engine_clock: Arc<dyn Clock> = clock.clone();
    let config = EngineConfig {
        max_retries: 3,
        retry_backoff: Duration::from_millis(1),
    };
    let engine = Arc::new(LedgerEngine::with_config(store, config, engine_clock));

    let cash = AccountId::new();
    engine
        .ensure_system_account(cash, Currency::USD)
        .await
        .expect("Failed to create cash account");

    TestLedger { engine, clock, cash }
}

impl<S: LedgerStore> TestLedger<S> {
    /// ACTIVE USD account funded by a cash deposit
    pub async fn open_funded(&self, balance: i64) -> AccountId {
        self.open_with_overdraft(balance, 0).await
    }

    pub async fn open_with_overdraft(&self, balance: i64, overdraft_limit_minor: i64) -> AccountId {
        let account = self
            .engine
            .open_account(
                OpenAccountCommand::new(HolderId::new(), Currency::USD)
                    .with_overdraft_limit(overdraft_limit_minor)
                    .active(),
            )
            .await
            .expect("Failed to open account");

        if balance > 0 {
            self.deposit(account.id(), balance).await;
        }
        account.id()
    }

    /// Account in the given status with zero balance
    pub async fn open_in_status(&self, status: AccountStatus) -> AccountId {
        let account = self
            .engine
            .open_account(OpenAccountCommand::new(HolderId::new(), Currency::USD))
            .await
            .expect("Failed to open account");

        match status {
            AccountStatus::Pending => {}
            AccountStatus::Active => {
                self.activate(account.id()).await;
            }
            AccountStatus::Blocked | AccountStatus::Closed => {
                self.activate(account.id()).await;
                self.engine
                    .change_account_status(account.id(), status)
                    .await
                    .expect("Failed to change status");
            }
        }
        account.id()
    }

    async fn activate(&self, id: AccountId) {
        self.engine
            .change_account_status(id, AccountStatus::Active)
            .await
            .expect("Failed to activate account");
    }

    pub async fn deposit(&self, account_id: AccountId, amount_minor: i64) {
        self.engine
            .post_entry(PostEntryCommand::cash_deposit(self.cash, account_id, usd(amount_minor)))
            .await
            .expect("Failed to post cash deposit");
    }

    pub async fn balance(&self, account_id: AccountId) -> i64 {
        self.engine
            .get_balance(account_id)
            .await
            .expect("Failed to read balance")
            .amount_minor()
    }
}

// =========================================================================
// PostgreSQL
// =========================================================================

const SCHEMA: &str = include_str!("../../migrations/001_ledger_schema.sql");

/// Connect to `DATABASE_URL`, apply the schema and empty every ledger table
pub async fn setup_test_db() -> sqlx::PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to apply schema");
    }

    sqlx::query("TRUNCATE TABLE transfers, journal_entry_lines, journal_entries, accounts CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    pool
}
