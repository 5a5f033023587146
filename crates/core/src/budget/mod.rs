//! Retry budgets.
//!
//! A retry budget attenuates the amplifying effect of many callers in one
//! process retrying the same failing dependency. Every call deposits into the
//! budget and every retry withdraws from it, so retries stay a bounded
//! fraction of traffic no matter how many attempts each call's backoff
//! schedule allows.
//!
//! ```
//! use tollgate_common::time::SystemClock;
//! use tollgate_core::budget::{BudgetKind, RetryBudgets};
//!
//! // Retry at most 20% of calls, with a floor of 10 retries per second.
//! let budget = RetryBudgets::create(10_000, 10, 0.2, SystemClock)?;
//! assert_eq!(budget.kind(), BudgetKind::Token);
//!
//! budget.deposit();
//! assert!(budget.try_withdraw());
//! # Ok::<(), tollgate_core::budget::BudgetError>(())
//! ```

pub mod constants;
mod fixed;
mod token;

use std::fmt::{self, Debug};
use std::sync::Arc;

pub use constants::{DEFAULT_TTL_MS, SCALE_FACTOR};
pub use fixed::{EmptyRetryBudget, InfiniteRetryBudget};
use thiserror::Error;
pub use token::TokenRetryBudget;
use tollgate_common::time::{Clock, SystemClock};
use tollgate_common::{impl_error_classification, CommonError, ErrorClassification, ErrorSeverity};
use tracing::debug;

use crate::bucket::{LeakyTokenBucket, TokenBucketError};

/// Capability limiting how many retries may be performed.
///
/// Implementations are safe to share between threads without extra locking.
pub trait RetryBudget: Send + Sync + Debug {
    /// Record a call; typically permits future withdrawals.
    fn deposit(&self);

    /// Withdraw one retry if the balance allows it.
    ///
    /// Returns `false` and leaves the balance untouched otherwise.
    fn try_withdraw(&self) -> bool;

    /// Retries that could be made right now. Never negative.
    fn balance(&self) -> i64;

    /// Which implementation backs this budget.
    fn kind(&self) -> BudgetKind;
}

impl<T: RetryBudget + ?Sized> RetryBudget for Arc<T> {
    fn deposit(&self) {
        (**self).deposit();
    }

    fn try_withdraw(&self) -> bool {
        (**self).try_withdraw()
    }

    fn balance(&self) -> i64 {
        (**self).balance()
    }

    fn kind(&self) -> BudgetKind {
        (**self).kind()
    }
}

/// A budget shared between every caller that should be throttled together.
pub type SharedRetryBudget = Arc<dyn RetryBudget>;

/// Implementation behind a [`RetryBudget`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BudgetKind {
    /// Never permits a retry.
    Empty,
    /// Always permits a retry.
    Infinite,
    /// Backed by a leaky token bucket.
    Token,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Infinite => write!(f, "infinite"),
            Self::Token => write!(f, "token"),
        }
    }
}

/// Errors raised while building a retry budget
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetError {
    /// Deposit lifetime outside the supported range.
    #[error("ttl_ms must be in [{min_ms}, {max_ms}], got {ttl_ms}")]
    TtlOutOfRange { ttl_ms: u64, min_ms: u64, max_ms: u64 },

    /// Retry percentage negative, NaN or above the scale factor.
    #[error("percent_can_retry must be in [0, {max}], got {percent}")]
    PercentOutOfRange { percent: f64, max: u64 },

    /// The backing bucket rejected its parameters.
    #[error(transparent)]
    Bucket(#[from] TokenBucketError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_classification!(
    BudgetError,
    Common,
    Self::TtlOutOfRange { .. } | Self::PercentOutOfRange { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Bucket(e) => {
        retryable: e.is_retryable(),
        severity: e.severity(),
        critical: e.is_critical(),
    },
);

/// Integer token amounts derived from the budget parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TokenAmounts {
    pub(crate) deposit: u64,
    pub(crate) withdrawal: u64,
    pub(crate) reserve: u64,
}

/// Check the parameters of [`RetryBudgets::create`] and scale them into
/// integer token amounts.
///
/// Returns `None` when neither a reserve nor a retry percentage was asked
/// for, which means the budget is empty.
pub(crate) fn token_amounts(
    ttl_ms: u64,
    min_retries_per_second: u32,
    percent_can_retry: f64,
) -> Result<Option<TokenAmounts>, BudgetError> {
    if !(constants::MIN_TTL_MS..=constants::MAX_TTL_MS).contains(&ttl_ms) {
        return Err(BudgetError::TtlOutOfRange {
            ttl_ms,
            min_ms: constants::MIN_TTL_MS,
            max_ms: constants::MAX_TTL_MS,
        });
    }
    // NaN fails the range check too.
    if !(0.0..=SCALE_FACTOR as f64).contains(&percent_can_retry) {
        return Err(BudgetError::PercentOutOfRange {
            percent: percent_can_retry,
            max: SCALE_FACTOR,
        });
    }
    if min_retries_per_second == 0 && percent_can_retry == 0.0 {
        return Ok(None);
    }

    let (deposit, withdrawal) = if percent_can_retry == 0.0 {
        (0, 1)
    } else {
        let withdrawal = (SCALE_FACTOR as f64 / percent_can_retry).floor();
        if withdrawal > i64::MAX as f64 {
            return Err(CommonError::config_field(
                "percent_can_retry",
                format!("{percent_can_retry} is too small to scale into whole tokens"),
            )
            .into());
        }
        (SCALE_FACTOR, withdrawal as u64)
    };

    let reserve = u64::from(min_retries_per_second)
        .checked_mul(ttl_ms / 1000)
        .and_then(|tokens| tokens.checked_mul(withdrawal))
        .filter(|tokens| i64::try_from(*tokens).is_ok())
        .ok_or_else(|| {
            CommonError::config_field(
                "min_retries_per_second",
                format!("reserve for {min_retries_per_second} retries/s overflows the bucket"),
            )
        })?;

    Ok(Some(TokenAmounts { deposit, withdrawal, reserve }))
}

/// Constructors for the shared retry budgets.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryBudgets;

impl RetryBudgets {
    /// A budget that never permits a retry.
    pub fn empty() -> SharedRetryBudget {
        Arc::new(EmptyRetryBudget)
    }

    /// A budget that always permits a retry.
    pub fn infinite() -> SharedRetryBudget {
        Arc::new(InfiniteRetryBudget)
    }

    /// A budget that lets roughly `percent_can_retry` of deposits be retried.
    ///
    /// - `ttl_ms`: deposits expire after roughly this long. Must lie in
    ///   `[1000, 60000]`.
    /// - `min_retries_per_second`: floor on the retry rate so that callers
    ///   with little traffic can still retry. `0` gives no reserve.
    /// - `percent_can_retry`: retries allowed per deposit, in addition to the
    ///   reserve. `0.1` allows one retry every 10 deposits, `2.0` allows two
    ///   retries per deposit. Must lie in `[0, 1000]`.
    ///
    /// When both the floor and the percentage are zero the result is an
    /// [`EmptyRetryBudget`].
    ///
    /// # Errors
    ///
    /// [`BudgetError`] when a parameter is outside its range or the scaled
    /// token amounts overflow.
    pub fn create<C: Clock>(
        ttl_ms: u64,
        min_retries_per_second: u32,
        percent_can_retry: f64,
        clock: C,
    ) -> Result<SharedRetryBudget, BudgetError> {
        let Some(amounts) = token_amounts(ttl_ms, min_retries_per_second, percent_can_retry)?
        else {
            debug!(ttl_ms, "retry budget has no reserve and no percentage; using empty budget");
            return Ok(Self::empty());
        };

        let bucket = LeakyTokenBucket::with_clock(ttl_ms, amounts.reserve, clock)?;
        let budget = TokenRetryBudget::new(bucket, amounts.deposit, amounts.withdrawal)?;
        debug!(
            ttl_ms,
            min_retries_per_second,
            percent_can_retry,
            deposit_amount = amounts.deposit,
            withdrawal_amount = amounts.withdrawal,
            reserve = amounts.reserve,
            "created token retry budget"
        );
        Ok(Arc::new(budget))
    }

    /// [`create`](Self::create) with the default 10 s TTL.
    ///
    /// # Errors
    ///
    /// See [`create`](Self::create).
    pub fn create_with_default_ttl<C: Clock>(
        min_retries_per_second: u32,
        percent_can_retry: f64,
        clock: C,
    ) -> Result<SharedRetryBudget, BudgetError> {
        Self::create(constants::DEFAULT_TTL_MS, min_retries_per_second, percent_can_retry, clock)
    }

    /// The conservative default: 10 s TTL, 10 retries per second, 20 %.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in parameters; the `Result` mirrors
    /// [`create`](Self::create).
    pub fn create_default<C: Clock>(clock: C) -> Result<SharedRetryBudget, BudgetError> {
        Self::create(
            constants::DEFAULT_TTL_MS,
            constants::DEFAULT_MIN_RETRIES_PER_SECOND,
            constants::DEFAULT_PERCENT_CAN_RETRY,
            clock,
        )
    }

    /// [`create_default`](Self::create_default) on the process clock.
    ///
    /// # Errors
    ///
    /// See [`create_default`](Self::create_default).
    pub fn system_default() -> Result<SharedRetryBudget, BudgetError> {
        Self::create_default(SystemClock)
    }
}
