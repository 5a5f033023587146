use std::fmt;

use tollgate_common::CommonError;
use tracing::warn;

use super::{BudgetError, BudgetKind, RetryBudget};
use crate::bucket::{LeakyTokenBucket, TokenBucket};

/// Retry budget backed by a token bucket.
///
/// Each deposit puts `deposit_amount` tokens and each retry takes
/// `withdrawal_amount`, so the ratio of the two is the fraction of calls that
/// may be retried. Scaling both into whole tokens keeps the bucket integer.
pub struct TokenRetryBudget<B: TokenBucket = LeakyTokenBucket> {
    bucket: B,
    deposit_amount: u64,
    withdrawal_amount: u64,
}

impl<B: TokenBucket> TokenRetryBudget<B> {
    /// Wrap `bucket` with the given token amounts.
    ///
    /// # Errors
    ///
    /// `withdrawal_amount` must be positive.
    pub fn new(bucket: B, deposit_amount: u64, withdrawal_amount: u64) -> Result<Self, BudgetError> {
        if withdrawal_amount == 0 {
            return Err(CommonError::validation("withdrawal_amount", "must be positive").into());
        }
        Ok(Self { bucket, deposit_amount, withdrawal_amount })
    }

    /// Tokens put per deposit.
    pub fn deposit_amount(&self) -> u64 {
        self.deposit_amount
    }

    /// Tokens taken per retry.
    pub fn withdrawal_amount(&self) -> u64 {
        self.withdrawal_amount
    }

    /// The underlying bucket.
    pub fn bucket(&self) -> &B {
        &self.bucket
    }
}

impl<B: TokenBucket> RetryBudget for TokenRetryBudget<B> {
    fn deposit(&self) {
        // A zero-percent budget only ever spends its reserve.
        if self.deposit_amount == 0 {
            return;
        }
        if let Err(error) = self.bucket.put(self.deposit_amount) {
            warn!(%error, deposit_amount = self.deposit_amount, "retry budget deposit rejected");
        }
    }

    fn try_withdraw(&self) -> bool {
        match self.bucket.try_get(self.withdrawal_amount) {
            Ok(withdrawn) => withdrawn,
            Err(error) => {
                warn!(
                    %error,
                    withdrawal_amount = self.withdrawal_amount,
                    "retry budget withdrawal rejected"
                );
                false
            }
        }
    }

    /// Whole withdrawals the bucket can currently cover.
    fn balance(&self) -> i64 {
        // Overdrawn buckets (concurrent withdrawals) report zero, not a debt.
        (self.bucket.count() / self.withdrawal_amount as i64).max(0)
    }

    fn kind(&self) -> BudgetKind {
        BudgetKind::Token
    }
}

impl<B: TokenBucket> fmt::Display for TokenRetryBudget<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TokenRetryBudget{{deposit={}, withdrawal={}, balance={}}}",
            self.deposit_amount,
            self.withdrawal_amount,
            self.balance()
        )
    }
}

impl<B: TokenBucket> fmt::Debug for TokenRetryBudget<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRetryBudget")
            .field("deposit_amount", &self.deposit_amount)
            .field("withdrawal_amount", &self.withdrawal_amount)
            .field("bucket", &self.bucket)
            .finish()
    }
}
