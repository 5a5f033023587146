// Error types for the retry module
use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;
use tollgate_common::{impl_error_classification, CommonError, ErrorClassification, ErrorSeverity};

use crate::budget::BudgetError;

/// Why a [`Retry`](super::Retry) call stopped retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonRetriableKind {
    /// Every delay in the backoff schedule has been used.
    LimitReached,
    /// The retry policy refused the failure.
    RejectedByPolicy,
    /// The retry budget had no balance left.
    BudgetExhausted,
    /// The caller's cancellation token fired during a backoff sleep.
    Cancelled,
    /// The operation itself asked to stop.
    Aborted,
}

impl fmt::Display for NonRetriableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LimitReached => "limit_reached",
            Self::RejectedByPolicy => "rejected_by_policy",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a retried call.
///
/// Carries the error that ended the call as its [`source`](StdError::source),
/// so the original failure is never lost.
#[derive(Debug, Clone, PartialEq)]
pub struct NonRetriableError<E> {
    kind: NonRetriableKind,
    message: String,
    cause: E,
}

impl<E> NonRetriableError<E> {
    /// Wrap `cause` with an explicit kind and message.
    pub fn new(kind: NonRetriableKind, message: impl Into<String>, cause: E) -> Self {
        Self { kind, message: message.into(), cause }
    }

    /// Why retrying stopped.
    pub fn kind(&self) -> NonRetriableKind {
        self.kind
    }

    /// Human readable description, including the cause.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failure that ended the call.
    pub fn cause(&self) -> &E {
        &self.cause
    }

    /// Take the failure that ended the call.
    pub fn into_cause(self) -> E {
        self.cause
    }

    /// `true` when the backoff schedule was used up.
    pub fn is_limit_reached(&self) -> bool {
        self.kind == NonRetriableKind::LimitReached
    }

    /// `true` when the policy refused to retry.
    pub fn is_rejected_by_policy(&self) -> bool {
        self.kind == NonRetriableKind::RejectedByPolicy
    }

    /// `true` when the budget refused to retry.
    pub fn is_budget_exhausted(&self) -> bool {
        self.kind == NonRetriableKind::BudgetExhausted
    }

    /// `true` when the call was cancelled between attempts.
    pub fn is_cancelled(&self) -> bool {
        self.kind == NonRetriableKind::Cancelled
    }
}

impl<E: fmt::Display> NonRetriableError<E> {
    pub(crate) fn limit_reached(limit: usize, cause: E) -> Self {
        let message = format!("Retry limit [{limit}] reached: {cause}");
        Self::new(NonRetriableKind::LimitReached, message, cause)
    }

    pub(crate) fn rejected_by_policy(cause: E) -> Self {
        let message = format!("An error was rejected by policy: {cause}");
        Self::new(NonRetriableKind::RejectedByPolicy, message, cause)
    }

    pub(crate) fn budget_exhausted(cause: E) -> Self {
        let message = format!("Budget was exhausted: {cause}");
        Self::new(NonRetriableKind::BudgetExhausted, message, cause)
    }

    pub(crate) fn cancelled(cause: E) -> Self {
        let message = format!("Retry was cancelled: {cause}");
        Self::new(NonRetriableKind::Cancelled, message, cause)
    }

    /// Stop retrying immediately because of `cause`.
    ///
    /// Returned from an operation (as [`OperationError::Terminal`]) it is
    /// passed through to the caller unchanged.
    pub fn abort(cause: E) -> Self {
        let message = format!("Operation aborted: {cause}");
        Self::new(NonRetriableKind::Aborted, message, cause)
    }
}

impl<E> fmt::Display for NonRetriableError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl<E> StdError for NonRetriableError<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.cause)
    }
}

impl<E> ErrorClassification for NonRetriableError<E> {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self.kind {
            NonRetriableKind::Cancelled | NonRetriableKind::Aborted => ErrorSeverity::Info,
            _ => ErrorSeverity::Warning,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<std::time::Duration> {
        None
    }
}

/// Outcome of one failed attempt, as returned by a retried operation.
///
/// `?` on any `Result<_, E>` inside the operation produces
/// [`Failed`](Self::Failed) through the `From<E>` impl.
#[derive(Debug)]
pub enum OperationError<E> {
    /// The attempt failed; policy, budget and schedule decide what happens
    /// next.
    Failed(E),
    /// Stop immediately and hand this error to the caller unchanged.
    Terminal(NonRetriableError<E>),
}

impl<E> OperationError<E> {
    /// Wrap an already terminal error.
    pub fn terminal(error: NonRetriableError<E>) -> Self {
        Self::Terminal(error)
    }
}

impl<E: fmt::Display> OperationError<E> {
    /// Stop retrying because of `cause`.
    pub fn abort(cause: E) -> Self {
        Self::Terminal(NonRetriableError::abort(cause))
    }
}

impl<E> From<E> for OperationError<E> {
    fn from(error: E) -> Self {
        Self::Failed(error)
    }
}

impl<E: fmt::Display> fmt::Display for OperationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(error) => error.fmt(f),
            Self::Terminal(error) => error.fmt(f),
        }
    }
}

/// Errors raised while building a [`Retry`](super::Retry)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryBuildError {
    /// No backoff schedule was configured, or it has no entries.
    #[error("backoff cannot be empty")]
    EmptyBackoff,

    /// A backoff delay is negative, NaN or too large to represent.
    #[error("backoff delay at index {index} must be a non-negative number of seconds, got {value}")]
    InvalidDelay { index: usize, value: f64 },

    /// The default budget could not be built.
    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_classification!(
    RetryBuildError,
    Common,
    Self::EmptyBackoff | Self::InvalidDelay { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Budget(e) => {
        retryable: e.is_retryable(),
        severity: e.severity(),
        critical: e.is_critical(),
    },
);
