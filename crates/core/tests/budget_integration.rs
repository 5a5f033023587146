//! Integration tests for buckets and retry budgets
//!
//! Drives every time-dependent type through a `FrozenClock` so decay is
//! deterministic.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tollgate_common::testing::FrozenClock;
use tollgate_core::budget::{BudgetKind, RetryBudget, RetryBudgets, TokenRetryBudget};
use tollgate_core::{BoundedTokenBucket, BudgetError, LeakyTokenBucket, TokenBucket};

/// Validates that deposits leave the budget once the TTL has passed.
///
/// # Test Steps
/// 1. Deposit ten calls into a 50% budget with no reserve
/// 2. Advance the clock past the TTL
/// 3. Verify the balance drained to zero and withdrawals fail
#[test]
fn test_token_budget_decays_after_ttl() {
    let clock = FrozenClock::at(0);
    let budget = RetryBudgets::create(1_000, 0, 0.5, clock.clone()).unwrap();

    for _ in 0..10 {
        budget.deposit();
    }
    assert_eq!(budget.balance(), 5);

    clock.advance(Duration::from_millis(500));
    assert_eq!(budget.balance(), 5, "half a TTL keeps every deposit");

    clock.advance(Duration::from_millis(600));
    assert_eq!(budget.balance(), 0);
    assert!(!budget.try_withdraw());
}

/// Validates that the reserve survives decay while deposits do not.
///
/// # Test Steps
/// 1. Create a budget with a reserve of 10 retries per second over 2 s
/// 2. Deposit, then let the TTL pass
/// 3. Verify the balance returns to exactly the reserve
#[test]
fn test_reserve_outlives_deposits() {
    let clock = FrozenClock::at(0);
    let budget = RetryBudgets::create(2_000, 10, 1.0, clock.clone()).unwrap();
    assert_eq!(budget.balance(), 20);

    for _ in 0..30 {
        budget.deposit();
    }
    assert_eq!(budget.balance(), 50);

    clock.advance_secs(3);
    assert_eq!(budget.balance(), 20);
}

/// Validates the budget kinds chosen by `RetryBudgets::create`.
#[test]
fn test_create_selects_kind() {
    let clock = FrozenClock::new();
    assert_eq!(
        RetryBudgets::create(10_000, 0, 0.0, clock.clone()).unwrap().kind(),
        BudgetKind::Empty
    );
    assert_eq!(RetryBudgets::create(10_000, 1, 0.0, clock).unwrap().kind(), BudgetKind::Token);
    assert_eq!(RetryBudgets::infinite().balance(), 100);
    assert_eq!(RetryBudgets::empty().balance(), 0);
}

/// Validates parameter validation of `RetryBudgets::create`.
///
/// # Test Steps
/// 1. TTL below and above the supported range
/// 2. Percentage negative, NaN and above the scale factor
#[test]
fn test_create_rejects_invalid_parameters() {
    let clock = FrozenClock::new();
    for ttl_ms in [0, 999, 60_001] {
        assert!(matches!(
            RetryBudgets::create(ttl_ms, 10, 0.2, clock.clone()),
            Err(BudgetError::TtlOutOfRange { .. })
        ));
    }
    for percent in [-0.1, f64::NAN, 1000.5] {
        assert!(matches!(
            RetryBudgets::create(10_000, 10, percent, clock.clone()),
            Err(BudgetError::PercentOutOfRange { .. })
        ));
    }
}

/// Validates a token budget over a hard-capped bucket.
///
/// # Test Steps
/// 1. Build a budget that deposits 10 and withdraws 1 over a bucket capped
///    at 25
/// 2. Deposit three times and verify the cap holds
/// 3. Drain the balance
#[test]
fn test_token_budget_over_bounded_bucket() {
    let bucket = BoundedTokenBucket::new(25).unwrap();
    let budget = TokenRetryBudget::new(bucket, 10, 1).unwrap();

    for _ in 0..3 {
        budget.deposit();
    }
    assert_eq!(budget.balance(), 25);

    let withdrawn = std::iter::repeat_with(|| budget.try_withdraw()).take_while(|ok| *ok).count();
    assert_eq!(withdrawn, 25);
    assert_eq!(budget.bucket().count(), 0);
}

/// Validates that one budget throttles every holder of it.
#[test]
fn test_shared_budget_between_holders() {
    let clock = FrozenClock::new();
    let budget = RetryBudgets::create(10_000, 0, 0.5, clock).unwrap();
    let other = Arc::clone(&budget);

    budget.deposit();
    other.deposit();
    assert!(other.try_withdraw());
    assert!(!budget.try_withdraw());
}

/// Validates that a leaky bucket reserve is spent exactly once.
#[test]
fn test_leaky_reserve_spent_once() {
    let clock = FrozenClock::at(0);
    let bucket = LeakyTokenBucket::with_clock(10_000, 5, clock.clone()).unwrap();

    assert!(bucket.try_get(5).unwrap());
    assert!(!bucket.try_get(1).unwrap());

    clock.advance_secs(11);
    assert!(bucket.try_get(5).unwrap(), "spent reserve comes back once it decays");
}

#[derive(Debug, Clone)]
enum BucketOp {
    Put(u64),
    Get(u64),
}

fn bucket_op() -> impl Strategy<Value = BucketOp> {
    prop_oneof![(1u64..200).prop_map(BucketOp::Put), (1u64..200).prop_map(BucketOp::Get)]
}

proptest! {
    /// The bounded bucket never leaves `[0, limit]` and grants a request
    /// exactly when enough tokens are present.
    #[test]
    fn prop_bounded_bucket_stays_in_bounds(
        limit in 1u64..1_000,
        ops in prop::collection::vec(bucket_op(), 0..100),
    ) {
        let bucket = BoundedTokenBucket::new(limit).unwrap();
        for op in ops {
            let before = bucket.count();
            match op {
                BucketOp::Put(n) => {
                    bucket.put(n).unwrap();
                    prop_assert_eq!(bucket.count(), (before + n as i64).min(limit as i64));
                }
                BucketOp::Get(n) => {
                    let granted = bucket.try_get(n).unwrap();
                    prop_assert_eq!(granted, before >= n as i64);
                }
            }
            prop_assert!((0..=limit as i64).contains(&bucket.count()));
        }
    }

    /// Greedy withdrawals after each deposit retry about `percent` of calls.
    #[test]
    fn prop_budget_retries_percentage_of_calls(percent in 0.01f64..0.7) {
        const CALLS: i64 = 2_000;
        let budget = RetryBudgets::create(60_000, 0, percent, FrozenClock::at(0)).unwrap();

        let mut retried = 0i64;
        for _ in 0..CALLS {
            budget.deposit();
            if budget.try_withdraw() {
                retried += 1;
            }
        }

        let expected = (CALLS as f64 * percent) as i64;
        prop_assert!(
            (expected - 1..=expected + 1).contains(&retried),
            "percent {}: expected {}, retried {}", percent, expected, retried
        );
    }

    /// A reserve-only budget starts with exactly `min * ttl_secs` retries.
    #[test]
    fn prop_reserve_only_initial_balance(ttl_secs in 1u64..=60, min in 0u32..100) {
        let budget = RetryBudgets::create(ttl_secs * 1000, min, 0.0, FrozenClock::new()).unwrap();
        prop_assert_eq!(budget.balance(), (ttl_secs * u64::from(min)) as i64);
    }
}
