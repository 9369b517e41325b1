//! Journal types
//!
//! A journal entry is one balanced accounting event; it exclusively owns its
//! lines. Lines refer to accounts by id only.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AccountId, EntryId, LedgerError, LineId, Money, MoneyError};

/// Line direction, from the customer's perspective.
///
/// `Debit` decreases the account balance, `Credit` increases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "DEBIT",
            Direction::Credit => "CREDIT",
        }
    }

    pub fn flip(&self) -> Direction {
        match self {
            Direction::Debit => Direction::Credit,
            Direction::Credit => Direction::Debit,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBIT" => Ok(Direction::Debit),
            "CREDIT" => Ok(Direction::Credit),
            other => Err(LedgerError::Storage(format!("unknown line direction {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Transfer,
    CashDeposit,
    CashWithdrawal,
    Fee,
    Interest,
    Adjustment,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Transfer => "TRANSFER",
            EntryType::CashDeposit => "CASH_DEPOSIT",
            EntryType::CashWithdrawal => "CASH_WITHDRAWAL",
            EntryType::Fee => "FEE",
            EntryType::Interest => "INTEREST",
            EntryType::Adjustment => "ADJUSTMENT",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRANSFER" => Ok(EntryType::Transfer),
            "CASH_DEPOSIT" => Ok(EntryType::CashDeposit),
            "CASH_WITHDRAWAL" => Ok(EntryType::CashWithdrawal),
            "FEE" => Ok(EntryType::Fee),
            "INTEREST" => Ok(EntryType::Interest),
            "ADJUSTMENT" => Ok(EntryType::Adjustment),
            other => Err(LedgerError::Storage(format!("unknown entry type {other:?}"))),
        }
    }
}

/// Entry lifecycle: PENDING -> POSTED -> REVERSED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Pending,
    Posted,
    Reversed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "PENDING",
            EntryStatus::Posted => "POSTED",
            EntryStatus::Reversed => "REVERSED",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(EntryStatus::Pending),
            "POSTED" => Ok(EntryStatus::Posted),
            "REVERSED" => Ok(EntryStatus::Reversed),
            other => Err(LedgerError::Storage(format!("unknown entry status {other:?}"))),
        }
    }
}

/// One debit or credit line. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub id: LineId,
    pub entry_id: EntryId,
    pub account_id: AccountId,
    pub direction: Direction,
    pub amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Booking date of the owning entry
    pub booking_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl JournalEntryLine {
    /// Signed balance effect of this line
    pub fn signed_amount(&self) -> Result<Money, MoneyError> {
        match self.direction {
            Direction::Debit => self.amount.try_neg(),
            Direction::Credit => Ok(self.amount),
        }
    }
}

/// One balanced accounting event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub entry_type: EntryType,
    pub status: EntryStatus,
    pub booking_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set on reversing entries: the entry this one undoes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverses: Option<EntryId>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<JournalEntryLine>,
}

impl JournalEntry {
    /// Sum of line amounts in one direction (checked)
    pub fn total(&self, direction: Direction) -> Result<i64, MoneyError> {
        self.lines
            .iter()
            .filter(|line| line.direction == direction)
            .try_fold(0i64, |acc, line| {
                acc.checked_add(line.amount.amount_minor())
                    .ok_or(MoneyError::Overflow)
            })
    }

    pub fn is_balanced(&self) -> bool {
        match (self.total(Direction::Debit), self.total(Direction::Credit)) {
            (Ok(debits), Ok(credits)) => debits == credits,
            _ => false,
        }
    }

    /// Ids of all accounts touched by this entry
    pub fn account_ids(&self) -> Vec<AccountId> {
        self.lines.iter().map(|line| line.account_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    fn line(entry_id: EntryId, direction: Direction, amount: i64) -> JournalEntryLine {
        JournalEntryLine {
            id: LineId::new(),
            entry_id,
            account_id: AccountId::new(),
            direction,
            amount: Money::new(amount, Currency::USD),
            value_date: None,
            description: None,
            booking_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            created_at: Utc::now(),
        }
    }

    fn entry(lines: Vec<(Direction, i64)>) -> JournalEntry {
        let id = EntryId::new();
        JournalEntry {
            id,
            entry_type: EntryType::Adjustment,
            status: EntryStatus::Pending,
            booking_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            value_date: None,
            external_reference: None,
            description: None,
            reverses: None,
            created_at: Utc::now(),
            lines: lines.into_iter().map(|(d, a)| line(id, d, a)).collect(),
        }
    }

    #[test]
    fn test_direction_flip() {
        assert_eq!(Direction::Debit.flip(), Direction::Credit);
        assert_eq!(Direction::Credit.flip(), Direction::Debit);
    }

    #[test]
    fn test_balanced_entry() {
        let balanced = entry(vec![
            (Direction::Debit, 300),
            (Direction::Credit, 200),
            (Direction::Credit, 100),
        ]);
        assert!(balanced.is_balanced());
        assert_eq!(balanced.total(Direction::Debit).unwrap(), 300);
    }

    #[test]
    fn test_unbalanced_entry() {
        let unbalanced = entry(vec![(Direction::Debit, 300), (Direction::Credit, 299)]);
        assert!(!unbalanced.is_balanced());
    }

    #[test]
    fn test_total_overflow_is_not_balanced() {
        let overflowing = entry(vec![
            (Direction::Debit, i64::MAX),
            (Direction::Debit, 1),
            (Direction::Credit, 1),
        ]);
        assert_eq!(overflowing.total(Direction::Debit), Err(MoneyError::Overflow));
        assert!(!overflowing.is_balanced());
    }

    #[test]
    fn test_signed_amount() {
        let id = EntryId::new();
        assert_eq!(line(id, Direction::Debit, 50).signed_amount().unwrap().amount_minor(), -50);
        assert_eq!(line(id, Direction::Credit, 50).signed_amount().unwrap().amount_minor(), 50);
    }

    #[test]
    fn test_enum_wire_format() {
        assert_eq!(
            serde_json::to_string(&EntryType::CashDeposit).unwrap(),
            "\"CASH_DEPOSIT\""
        );
        assert_eq!("CASH_WITHDRAWAL".parse::<EntryType>().unwrap(), EntryType::CashWithdrawal);
        assert_eq!("REVERSED".parse::<EntryStatus>().unwrap(), EntryStatus::Reversed);
    }
}
