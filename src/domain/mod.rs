//! Domain module
//!
//! Core ledger types: money, accounts, journal entries, transfers.

pub mod account;
pub mod clock;
pub mod error;
pub mod ids;
pub mod journal;
pub mod money;
pub mod transfer;

pub use account::{Account, AccountStatus};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ErrorKind, FailureReason, LedgerError};
pub use ids::{AccountId, EntryId, HolderId, LineId, TransferId, SYSTEM_HOLDER_ID};
pub use journal::{Direction, EntryStatus, EntryType, JournalEntry, JournalEntryLine};
pub use money::{Currency, Money, MoneyError};
pub use transfer::{Transfer, TransferStatus};
