//! Account Ledger
//!
//! The only code that changes a stored account balance. It is called by the
//! journal store, once per line, inside the transaction that inserts the line.

use chrono::{DateTime, Utc};

use crate::domain::{Account, AccountId, Direction, LedgerError, Money};
use crate::store::LedgerTransaction;

/// Balance after applying one line, or why the line may not be applied.
///
/// DEBIT subtracts, CREDIT adds. The account must be ACTIVE, in the line's
/// currency, and stay at or above `-overdraft_limit`.
pub fn next_balance(account: &Account, direction: Direction, amount: &Money) -> Result<i64, LedgerError> {
    if !account.is_active() {
        return Err(LedgerError::AccountNotActive {
            account_id: account.id(),
            status: account.status(),
        });
    }

    account.balance().ensure_same_currency(amount)?;

    let next = match direction {
        Direction::Debit => account.balance().try_sub(amount)?,
        Direction::Credit => account.balance().try_add(amount)?,
    };

    if next.amount_minor() < account.balance_floor() {
        return Err(LedgerError::InsufficientFunds {
            account_id: account.id(),
            balance: account.balance_minor(),
            requested: amount.amount_minor(),
            overdraft_limit: account.overdraft_limit_minor(),
        });
    }

    Ok(next.amount_minor())
}

/// Apply one line to a locked account and write the new balance into `tx`.
pub async fn apply_line<T: LedgerTransaction>(
    tx: &mut T,
    account_id: AccountId,
    direction: Direction,
    amount: &Money,
    at: DateTime<Utc>,
) -> Result<Money, LedgerError> {
    let account = tx
        .account(account_id)
        .ok_or(LedgerError::AccountNotFound(account_id))?;
    let balance = next_balance(account, direction, amount)?;

    tx.update_balance(account_id, balance, at).await?;

    let updated = tx
        .account(account_id)
        .ok_or_else(|| LedgerError::invariant(format!("account {account_id} left the locked set")))?;
    if updated.balance_minor() != balance || !updated.satisfies_floor() {
        return Err(LedgerError::invariant(format!(
            "account {account_id} balance {} after apply, expected {balance}",
            updated.balance_minor()
        )));
    }

    tracing::debug!(
        account_id = %account_id,
        direction = %direction,
        amount = amount.amount_minor(),
        balance,
        "Applied journal line"
    );

    Ok(updated.balance())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountStatus, Currency, HolderId};

    fn active(balance: i64, overdraft: i64) -> Account {
        let now = Utc::now();
        Account::open(AccountId::new(), HolderId::new(), Currency::USD, overdraft, now)
            .unwrap()
            .transition(AccountStatus::Active, now)
            .unwrap()
            .with_balance(balance, now)
    }

    fn usd(amount: i64) -> Money {
        Money::new(amount, Currency::USD)
    }

    #[test]
    fn test_debit_and_credit() {
        let account = active(1000, 0);
        assert_eq!(next_balance(&account, Direction::Debit, &usd(300)).unwrap(), 700);
        assert_eq!(next_balance(&account, Direction::Credit, &usd(300)).unwrap(), 1300);
    }

    #[test]
    fn test_insufficient_funds() {
        let account = active(1000, 0);
        let err = next_balance(&account, Direction::Debit, &usd(1500)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                account_id: account.id(),
                balance: 1000,
                requested: 1500,
                overdraft_limit: 0,
            }
        );
    }

    #[test]
    fn test_overdraft_floor_is_inclusive() {
        let account = active(100, 50);
        assert_eq!(next_balance(&account, Direction::Debit, &usd(150)).unwrap(), -50);
        assert!(next_balance(&account, Direction::Debit, &usd(151)).is_err());
    }

    #[test]
    fn test_inactive_account_rejected() {
        let now = Utc::now();
        let blocked = active(100, 0).transition(AccountStatus::Blocked, now).unwrap();
        assert!(matches!(
            next_balance(&blocked, Direction::Credit, &usd(1)),
            Err(LedgerError::AccountNotActive { status: AccountStatus::Blocked, .. })
        ));
    }

    #[test]
    fn test_currency_mismatch() {
        let account = active(100, 0);
        let eur = Money::new(10, Currency::EUR);
        assert!(matches!(
            next_balance(&account, Direction::Credit, &eur),
            Err(LedgerError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_credit_overflow() {
        let account = active(i64::MAX - 1, 0);
        assert_eq!(
            next_balance(&account, Direction::Credit, &usd(2)),
            Err(LedgerError::Overflow)
        );
    }

    #[test]
    fn test_system_account_can_go_negative() {
        let account = Account::system(AccountId::new(), Currency::USD, Utc::now());
        assert_eq!(next_balance(&account, Direction::Debit, &usd(500)).unwrap(), -500);
    }
}
