//! Race properties over arbitrary delays.

use crate::common::*;
use proptest::prelude::*;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Guarded backends commit exactly one of two full-balance withdrawals,
    /// whatever the timing, and never overdraw.
    #[test]
    fn guarded_backends_commit_exactly_one(
        first_ms in 0u64..3_000,
        second_ms in 0u64..3_000,
        pessimistic in any::<bool>(),
    ) {
        let backend = if pessimistic { BackendKind::Pessimistic } else { BackendKind::Optimistic };
        let report = paused_runtime().block_on(async {
            let db = Steadfast::in_memory(backend).unwrap();
            run_withdrawal_race(
                &db,
                TEST_ACCOUNT_BALANCE,
                TEST_ACCOUNT_BALANCE,
                &[Duration::from_millis(first_ms), Duration::from_millis(second_ms)],
            )
            .await
            .unwrap()
        });

        prop_assert_eq!(report.successes(), 1);
        for err in report.failures() {
            prop_assert!(err.is_conflict() || err.is_domain_violation(), "unexpected error: {}", err);
        }
        prop_assert_eq!(report.final_account.balance(), Money::ZERO);
        prop_assert_eq!(report.final_account.version(), Version::new(2));
        prop_assert!(!report.lost_update());
    }

    /// Debits that fit never lose an update on the guarded backends.
    #[test]
    fn guarded_debits_add_up(
        amount in 1i64..50_000,
        delays in proptest::collection::vec(0u64..2_000, 1..5),
        pessimistic in any::<bool>(),
    ) {
        let backend = if pessimistic { BackendKind::Pessimistic } else { BackendKind::Optimistic };
        let delays: Vec<Duration> = delays.into_iter().map(Duration::from_millis).collect();
        let report = paused_runtime().block_on(async {
            let db = Steadfast::in_memory(backend).unwrap();
            run_withdrawal_race(&db, TEST_ACCOUNT_BALANCE, Money::from_major(amount), &delays)
                .await
                .unwrap()
        });

        let debited = report.initial.balance().minor_units() - report.final_account.balance().minor_units();
        prop_assert_eq!(report.total_debited().minor_units(), debited);
        prop_assert_eq!(
            report.final_account.version().as_u64(),
            1 + report.successes() as u64
        );
    }
}
