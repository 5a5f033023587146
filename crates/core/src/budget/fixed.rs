use super::constants::INFINITE_BALANCE;
use super::{BudgetKind, RetryBudget};

/// A budget with no balance; never allows a retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyRetryBudget;

impl RetryBudget for EmptyRetryBudget {
    fn deposit(&self) {}

    fn try_withdraw(&self) -> bool {
        false
    }

    fn balance(&self) -> i64 {
        0
    }

    fn kind(&self) -> BudgetKind {
        BudgetKind::Empty
    }
}

/// A budget whose balance is fixed at 100; always allows a retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InfiniteRetryBudget;

impl RetryBudget for InfiniteRetryBudget {
    fn deposit(&self) {}

    fn try_withdraw(&self) -> bool {
        true
    }

    fn balance(&self) -> i64 {
        INFINITE_BALANCE
    }

    fn kind(&self) -> BudgetKind {
        BudgetKind::Infinite
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `EmptyRetryBudget` behavior for the empty scenario.
    ///
    /// Assertions:
    /// - Confirms the balance stays 0 and withdrawals fail, before and after a
    ///   deposit.
    #[test]
    fn test_empty_budget_is_empty() {
        let budget = EmptyRetryBudget;

        assert_eq!(budget.balance(), 0);
        assert!(!budget.try_withdraw());

        budget.deposit();
        assert_eq!(budget.balance(), 0);
        assert!(!budget.try_withdraw());
        assert_eq!(budget.kind(), BudgetKind::Empty);
    }

    /// Validates `InfiniteRetryBudget` behavior for the infinite scenario.
    ///
    /// Assertions:
    /// - Confirms the balance is 100 and never moves.
    #[test]
    fn test_infinite_budget_is_infinite() {
        let budget = InfiniteRetryBudget;

        assert_eq!(budget.balance(), 100);
        for _ in 0..1_000 {
            assert!(budget.try_withdraw());
        }
        budget.deposit();
        assert_eq!(budget.balance(), 100);
        assert_eq!(budget.kind(), BudgetKind::Infinite);
    }
}
