use payments_ledger::application::service::PaymentsService;
use payments_ledger::domain::account::{Amount, WORLD_ACCOUNT_ID};
use proptest::prelude::*;
use rust_decimal::Decimal;

mod common;
use common::{in_memory_service, usd};

#[derive(Debug, Clone)]
enum Step {
    Deposit { to: usize, cents: i64 },
    Transfer { from: usize, to: usize, cents: i64 },
}

fn step(accounts: usize) -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..accounts, 1i64..50_000).prop_map(|(to, cents)| Step::Deposit { to, cents }),
        (0..accounts, 0..accounts, 1i64..50_000)
            .prop_map(|(from, to, cents)| Step::Transfer { from, to, cents }),
    ]
}

fn cents(value: i64) -> Amount {
    Amount::new(Decimal::new(value, 2)).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: whatever sequence of deposits and transfers runs, accepted or
    /// rejected, the ledger holds exactly what entered it from the world
    /// account and no balance goes negative.
    #[test]
    fn money_is_conserved(steps in prop::collection::vec(step(4), 1..40)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let service = in_memory_service();
            let mut ids = Vec::new();
            for name in ["a", "b", "c", "d"] {
                ids.push(service.create_account(name.to_string(), usd()).await.unwrap().id);
            }

            for step in steps {
                let _ = match step {
                    Step::Deposit { to, cents: value } => service
                        .make_deposit(ids[to], usd(), cents(value))
                        .await
                        .map(|_| ()),
                    Step::Transfer { from, to, cents: value } => service
                        .make_transfer(ids[from], ids[to], usd(), cents(value))
                        .await
                        .map(|_| ()),
                };
            }

            let accounts = service.get_accounts().await.unwrap();
            let held: Decimal = accounts.iter().map(|a| a.balance.value()).sum();
            let entered: Decimal = service
                .get_account_operations(WORLD_ACCOUNT_ID)
                .await
                .unwrap()
                .iter()
                .flat_map(|op| op.transactions.iter())
                .map(|tx| tx.amount.value())
                .sum();

            assert_eq!(held, entered);
            assert!(accounts.iter().all(|a| a.balance.value() >= Decimal::ZERO));
        });
    }
}
