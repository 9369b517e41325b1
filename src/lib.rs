//! core_ledger Library
//!
//! Double-entry ledger engine: journal entries, account balances and the
//! transfer state machine, over an in-memory or PostgreSQL store.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod idempotency;
pub mod ledger;
pub mod store;

mod error;

pub use config::Config;
pub use domain::{LedgerError, Money};
pub use error::{AppError, AppResult, ErrorResponse};
pub use ledger::{EngineConfig, LedgerEngine};
pub use store::{InMemoryLedgerStore, LedgerStore, PgLedgerStore};
