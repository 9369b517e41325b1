//! Account
//!
//! Deposit account snapshot. The balance field is private: it only changes
//! through [`crate::ledger::account_ledger`], which applies journal lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AccountId, Currency, HolderId, LedgerError, Money};

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Pending,
    Active,
    Blocked,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "PENDING",
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Blocked => "BLOCKED",
            AccountStatus::Closed => "CLOSED",
        }
    }

    /// PENDING -> ACTIVE -> {BLOCKED, CLOSED}, BLOCKED -> ACTIVE
    pub fn can_transition_to(&self, next: AccountStatus) -> bool {
        use AccountStatus::*;
        matches!(
            (self, next),
            (Pending, Active) | (Active, Blocked) | (Active, Closed) | (Blocked, Active)
        )
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(AccountStatus::Pending),
            "ACTIVE" => Ok(AccountStatus::Active),
            "BLOCKED" => Ok(AccountStatus::Blocked),
            "CLOSED" => Ok(AccountStatus::Closed),
            other => Err(LedgerError::Storage(format!("unknown account status {other:?}"))),
        }
    }
}

/// Deposit account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    holder_id: HolderId,
    currency: Currency,
    balance_minor: i64,
    overdraft_limit_minor: i64,
    status: AccountStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Account {
    /// Open a new account with zero balance in `PENDING` status.
    ///
    /// # Errors
    /// - `LedgerError::InvalidAmount` if the overdraft limit is negative
    pub fn open(
        id: AccountId,
        holder_id: HolderId,
        currency: Currency,
        overdraft_limit_minor: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        if overdraft_limit_minor < 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "overdraft limit must be >= 0 (got {overdraft_limit_minor})"
            )));
        }

        Ok(Self {
            id,
            holder_id,
            currency,
            balance_minor: 0,
            overdraft_limit_minor,
            status: AccountStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Internal account owned by the system holder, already `ACTIVE`.
    ///
    /// The overdraft limit is unbounded so it can carry the contra side of
    /// cash deposits and similar postings.
    pub fn system(id: AccountId, currency: Currency, now: DateTime<Utc>) -> Self {
        Self {
            id,
            holder_id: HolderId::system(),
            currency,
            balance_minor: 0,
            overdraft_limit_minor: i64::MAX,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild an account from persisted columns (store backends only)
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_db_state(
        id: AccountId,
        holder_id: HolderId,
        currency: Currency,
        balance_minor: i64,
        overdraft_limit_minor: i64,
        status: AccountStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            holder_id,
            currency,
            balance_minor,
            overdraft_limit_minor,
            status,
            created_at,
            updated_at,
        }
    }

    /// Move to another lifecycle status
    pub fn transition(&self, next: AccountStatus, now: DateTime<Utc>) -> Result<Account, LedgerError> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }

        let mut account = self.clone();
        account.status = next;
        account.updated_at = now;
        Ok(account)
    }

    /// Copy with a new balance; callers are the account ledger and stores
    pub(crate) fn with_balance(&self, balance_minor: i64, now: DateTime<Utc>) -> Account {
        let mut account = self.clone();
        account.balance_minor = balance_minor;
        account.updated_at = now;
        account
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn holder_id(&self) -> HolderId {
        self.holder_id
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn balance_minor(&self) -> i64 {
        self.balance_minor
    }

    pub fn balance(&self) -> Money {
        Money::new(self.balance_minor, self.currency)
    }

    pub fn overdraft_limit_minor(&self) -> i64 {
        self.overdraft_limit_minor
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_system(&self) -> bool {
        self.holder_id == HolderId::system()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Lowest balance the account may reach: `-overdraft_limit`
    pub fn balance_floor(&self) -> i64 {
        // limit is in 0..=i64::MAX so negation cannot overflow
        -self.overdraft_limit_minor
    }

    pub fn satisfies_floor(&self) -> bool {
        self.balance_minor >= self.balance_floor()
    }
}
