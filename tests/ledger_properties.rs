//! Property tests: conservation and floors under arbitrary transfer sequences

use proptest::prelude::*;

use core_ledger::domain::{Direction, TransferStatus};
use core_ledger::ledger::TransferCommand;

mod common;

#[derive(Debug, Clone)]
struct Step {
    from: usize,
    to: usize,
    amount_minor: i64,
}

fn step() -> impl Strategy<Value = Step> {
    (0usize..3, 0usize..3, -50i64..1_500).prop_map(|(from, to, amount_minor)| Step {
        from,
        to,
        amount_minor,
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn transfers_conserve_money_and_respect_floors(
        initial in proptest::collection::vec(0i64..2_000, 3),
        overdraft in proptest::collection::vec(0i64..500, 3),
        steps in proptest::collection::vec(step(), 1..25),
    ) {
        tokio_test::block_on(async {
            let ledger = common::setup().await;

            let mut accounts = Vec::new();
            for i in 0..3 {
                accounts.push(ledger.open_with_overdraft(initial[i], overdraft[i]).await);
            }
            let total: i64 = initial.iter().sum();

            let mut expected = initial.clone();
            for s in &steps {
                let transfer = ledger
                    .engine
                    .request_transfer(TransferCommand::new(
                        accounts[s.from],
                        accounts[s.to],
                        common::usd(s.amount_minor),
                    ))
                    .await
                    .unwrap();

                let allowed = s.from != s.to
                    && s.amount_minor > 0
                    && expected[s.from] - s.amount_minor >= -overdraft[s.from];
                if allowed {
                    prop_assert_eq!(transfer.status, TransferStatus::Executed);
                    expected[s.from] -= s.amount_minor;
                    expected[s.to] += s.amount_minor;

                    // Exactly one debit and one credit of the requested amount
                    let entry = ledger
                        .engine
                        .entry(transfer.journal_entry_id.unwrap())
                        .await
                        .unwrap();
                    prop_assert!(entry.is_balanced());
                    prop_assert_eq!(entry.total(Direction::Debit).unwrap(), s.amount_minor);
                } else {
                    prop_assert_eq!(transfer.status, TransferStatus::Failed);
                    prop_assert!(transfer.failure_reason.is_some());
                }
            }

            let mut sum = 0;
            for (i, id) in accounts.iter().enumerate() {
                let balance = ledger.balance(*id).await;
                prop_assert_eq!(balance, expected[i]);
                prop_assert!(balance >= -overdraft[i]);
                sum += balance;
            }
            prop_assert_eq!(sum, total);
            prop_assert_eq!(ledger.balance(ledger.cash).await, -total);
            Ok(())
        })?;
    }

    #[test]
    fn reversal_restores_every_balance(
        amounts in proptest::collection::vec(1i64..1_000, 1..10),
    ) {
        tokio_test::block_on(async {
            let ledger = common::setup().await;
            let x = ledger.open_funded(10_000).await;
            let y = ledger.open_funded(0).await;

            let mut entries = Vec::new();
            for amount in &amounts {
                let transfer = ledger
                    .engine
                    .request_transfer(TransferCommand::new(x, y, common::usd(*amount)))
                    .await
                    .unwrap();
                entries.push(transfer.journal_entry_id.unwrap());
            }

            // Undo in reverse order so the receiver never dips below zero
            for entry_id in entries.iter().rev() {
                ledger.engine.reverse_entry(*entry_id).await.unwrap();
            }

            prop_assert_eq!(ledger.balance(x).await, 10_000);
            prop_assert_eq!(ledger.balance(y).await, 0);

            let lines = ledger.engine.list_lines(y, None, None).await.unwrap();
            prop_assert_eq!(lines.len(), amounts.len() * 2);
            Ok(())
        })?;
    }
}
