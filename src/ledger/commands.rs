//! Command definitions
//!
//! Commands carry a caller's intent into the engine. They are plain data;
//! validation happens in the component that executes them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, Currency, Direction, EntryType, HolderId, Money};

// =========================================================================
// TransferCommand
// =========================================================================

/// Request to move money between two customer accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount_minor: i64,
    pub currency: Currency,
    pub description: Option<String>,
    /// Caller token; a repeated request with the same key is not re-executed
    pub idempotency_key: Option<String>,
}

impl TransferCommand {
    pub fn new(from: AccountId, to: AccountId, amount: Money) -> Self {
        Self {
            from_account_id: from,
            to_account_id: to,
            amount_minor: amount.amount_minor(),
            currency: amount.currency(),
            description: None,
            idempotency_key: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

// =========================================================================
// PostEntryCommand
// =========================================================================

/// One requested journal line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCommand {
    pub account_id: AccountId,
    pub direction: Direction,
    pub amount: Money,
    pub value_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl LineCommand {
    pub fn debit(account_id: AccountId, amount: Money) -> Self {
        Self::new(account_id, Direction::Debit, amount)
    }

    pub fn credit(account_id: AccountId, amount: Money) -> Self {
        Self::new(account_id, Direction::Credit, amount)
    }

    pub fn new(account_id: AccountId, direction: Direction, amount: Money) -> Self {
        Self {
            account_id,
            direction,
            amount,
            value_date: None,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Request to post a balanced journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEntryCommand {
    pub entry_type: EntryType,
    pub lines: Vec<LineCommand>,
    /// Defaults to the engine clock's current date
    pub booking_date: Option<NaiveDate>,
    pub value_date: Option<NaiveDate>,
    pub external_reference: Option<String>,
    pub description: Option<String>,
}

impl PostEntryCommand {
    pub fn new(entry_type: EntryType, lines: Vec<LineCommand>) -> Self {
        Self {
            entry_type,
            lines,
            booking_date: None,
            value_date: None,
            external_reference: None,
            description: None,
        }
    }

    /// `DEBIT from`, `CREDIT to`
    pub fn transfer(from: AccountId, to: AccountId, amount: Money) -> Self {
        Self::new(
            EntryType::Transfer,
            vec![LineCommand::debit(from, amount), LineCommand::credit(to, amount)],
        )
    }

    /// Cash paid in at the counter: the cash account carries the contra debit
    pub fn cash_deposit(cash_account: AccountId, account: AccountId, amount: Money) -> Self {
        Self::new(
            EntryType::CashDeposit,
            vec![
                LineCommand::debit(cash_account, amount),
                LineCommand::credit(account, amount),
            ],
        )
    }

    pub fn cash_withdrawal(cash_account: AccountId, account: AccountId, amount: Money) -> Self {
        Self::new(
            EntryType::CashWithdrawal,
            vec![
                LineCommand::debit(account, amount),
                LineCommand::credit(cash_account, amount),
            ],
        )
    }

    /// Charge `account` and book the income on `fee_income_account`
    pub fn fee(account: AccountId, fee_income_account: AccountId, amount: Money) -> Self {
        Self::new(
            EntryType::Fee,
            vec![
                LineCommand::debit(account, amount),
                LineCommand::credit(fee_income_account, amount),
            ],
        )
    }

    /// Pay interest to `account` out of `interest_expense_account`
    pub fn interest(interest_expense_account: AccountId, account: AccountId, amount: Money) -> Self {
        Self::new(
            EntryType::Interest,
            vec![
                LineCommand::debit(interest_expense_account, amount),
                LineCommand::credit(account, amount),
            ],
        )
    }

    pub fn adjustment(lines: Vec<LineCommand>) -> Self {
        Self::new(EntryType::Adjustment, lines)
    }

    pub fn with_booking_date(mut self, booking_date: NaiveDate) -> Self {
        self.booking_date = Some(booking_date);
        self
    }

    pub fn with_value_date(mut self, value_date: NaiveDate) -> Self {
        self.value_date = Some(value_date);
        self
    }

    pub fn with_external_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn account_ids(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.lines.iter().map(|line| line.account_id)
    }
}

// =========================================================================
// OpenAccountCommand
// =========================================================================

/// Request to open a deposit account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccountCommand {
    /// Generated when absent
    pub account_id: Option<AccountId>,
    pub holder_id: HolderId,
    pub currency: Currency,
    pub overdraft_limit_minor: i64,
    /// Open directly in ACTIVE instead of PENDING
    pub activate: bool,
}

impl OpenAccountCommand {
    pub fn new(holder_id: HolderId, currency: Currency) -> Self {
        Self {
            account_id: None,
            holder_id,
            currency,
            overdraft_limit_minor: 0,
            activate: false,
        }
    }

    pub fn with_id(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn with_overdraft_limit(mut self, overdraft_limit_minor: i64) -> Self {
        self.overdraft_limit_minor = overdraft_limit_minor;
        self
    }

    pub fn active(mut self) -> Self {
        self.activate = true;
        self
    }
}
