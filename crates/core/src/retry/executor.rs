//! Bounded retry execution.
//!
//! A [`Retry`] runs an operation, and on failure consults (in order) the
//! backoff schedule, the policy and the budget before sleeping and trying
//! again. Every call deposits into the budget once; every retry withdraws
//! once. An operation is invoked at most `backoff().len() + 1` times.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tollgate_common::time::Clock;

use super::error::{NonRetriableError, OperationError, RetryBuildError};
use super::metrics::RetryMetrics;
use super::policy::{RetryPolicies, SharedRetryPolicy};
use super::tracing::{RetrySpan, RetryTracer};
use crate::budget::{RetryBudgets, SharedRetryBudget};

/// Result of a retried call together with the metrics it produced
pub type RetryResultWithMetrics<T, E> = (Result<T, NonRetriableError<E>>, RetryMetrics);

const UNNAMED_OPERATION: &str = "unnamed";

/// Retries an operation according to a backoff schedule, a policy and a
/// budget.
///
/// Cloning is cheap and clones share the same policy and budget, so a single
/// budget can throttle every caller of a dependency.
///
/// ```
/// use tollgate_core::retry::{OperationError, Retry, RetryPolicies};
/// use tollgate_core::budget::RetryBudgets;
///
/// let retry = Retry::builder()
///     .constant_backoff(3, 0.0)
///     .policy(RetryPolicies::always())
///     .budget(RetryBudgets::infinite())
///     .build()?;
///
/// let value = retry.call(|attempt| {
///     if attempt < 2 {
///         Err(OperationError::Failed(std::io::Error::other("flaky")))
///     } else {
///         Ok(attempt)
///     }
/// });
/// assert_eq!(value.unwrap(), 2);
/// # Ok::<(), tollgate_core::retry::RetryBuildError>(())
/// ```
#[derive(Clone)]
pub struct Retry {
    backoff: Arc<[Duration]>,
    policy: SharedRetryPolicy,
    budget: SharedRetryBudget,
}

impl Retry {
    /// Start configuring a retry.
    pub fn builder() -> RetryBuilder {
        RetryBuilder::new()
    }

    /// `num_retries` retries, each preceded by `delay_secs` seconds, with
    /// the default policy and budget.
    ///
    /// # Errors
    ///
    /// See [`RetryBuilder::build`].
    pub fn constant_backoff(num_retries: usize, delay_secs: f64) -> Result<Self, RetryBuildError> {
        Self::builder().constant_backoff(num_retries, delay_secs).build()
    }

    /// One retry per entry of `delays_secs`, with the default policy and
    /// budget.
    ///
    /// # Errors
    ///
    /// See [`RetryBuilder::build`].
    pub fn backoff_secs(delays_secs: &[f64]) -> Result<Self, RetryBuildError> {
        Self::builder().backoff_secs(delays_secs).build()
    }

    /// Delay before each retry; its length is the retry limit.
    pub fn backoff(&self) -> &[Duration] {
        &self.backoff
    }

    /// Maximum number of retries after the first attempt.
    pub fn max_retries(&self) -> usize {
        self.backoff.len()
    }

    /// Policy consulted on each failure.
    pub fn policy(&self) -> &SharedRetryPolicy {
        &self.policy
    }

    /// Budget charged for each retry.
    pub fn budget(&self) -> &SharedRetryBudget {
        &self.budget
    }

    /// Run `operation`, retrying failures until it succeeds or a terminal
    /// condition is hit.
    ///
    /// `operation` receives the zero-based attempt index. Delays block the
    /// calling thread; use [`call_async`](Self::call_async) inside a runtime.
    ///
    /// # Errors
    ///
    /// [`NonRetriableError`] carrying the last failure once the schedule,
    /// the policy or the budget refuses another attempt, or the terminal
    /// error the operation returned itself.
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, NonRetriableError<E>>
    where
        F: FnMut(u32) -> Result<T, OperationError<E>>,
        E: StdError + 'static,
    {
        self.call_with_metrics(UNNAMED_OPERATION, operation).0
    }

    /// [`call`](Self::call), also reporting what happened.
    pub fn call_with_metrics<T, E, F>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> RetryResultWithMetrics<T, E>
    where
        F: FnMut(u32) -> Result<T, OperationError<E>>,
        E: StdError + 'static,
    {
        let mut call = CallState::begin(self, operation_name);
        let mut attempt = 0;
        loop {
            call.before_attempt(attempt);
            match operation(attempt) {
                Ok(value) => return call.succeed(value),
                Err(failure) => match call.next_delay(failure, attempt, None) {
                    Ok((delay, _)) => {
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                    Err(error) => return call.fail(error),
                },
            }
            attempt += 1;
        }
    }

    /// Wrap `operation` into a callable that runs it through
    /// [`call`](Self::call) each time it is invoked.
    pub fn decorate<T, E, F>(
        &self,
        mut operation: F,
    ) -> impl FnMut() -> Result<T, NonRetriableError<E>>
    where
        F: FnMut(u32) -> Result<T, OperationError<E>>,
        E: StdError + 'static,
    {
        let retry = self.clone();
        move || retry.call(&mut operation)
    }

    /// Async [`call`](Self::call); backoff sleeps suspend only the calling
    /// task.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn call_async<T, E, F, Fut>(&self, operation: F) -> Result<T, NonRetriableError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperationError<E>>>,
        E: StdError + 'static,
    {
        self.run_async(UNNAMED_OPERATION, operation, None).await.0
    }

    /// Async [`call_with_metrics`](Self::call_with_metrics).
    pub async fn call_async_with_metrics<T, E, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> RetryResultWithMetrics<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperationError<E>>>,
        E: StdError + 'static,
    {
        self.run_async(operation_name, operation, None).await
    }

    /// Async [`call`](Self::call) that gives up when `cancel` fires during a
    /// backoff sleep.
    ///
    /// # Errors
    ///
    /// As [`call`](Self::call), plus a
    /// [`Cancelled`](super::NonRetriableKind::Cancelled) error carrying the
    /// last failure when the token is cancelled between attempts.
    pub async fn call_async_with_cancellation<T, E, F, Fut>(
        &self,
        operation: F,
        cancel: &CancellationToken,
    ) -> Result<T, NonRetriableError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperationError<E>>>,
        E: StdError + 'static,
    {
        self.run_async(UNNAMED_OPERATION, operation, Some(cancel)).await.0
    }

    async fn run_async<T, E, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
        cancel: Option<&CancellationToken>,
    ) -> RetryResultWithMetrics<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, OperationError<E>>>,
        E: StdError + 'static,
    {
        let mut call = CallState::begin(self, operation_name);
        let mut attempt = 0;
        loop {
            call.before_attempt(attempt);
            match operation(attempt).await {
                Ok(value) => return call.succeed(value),
                Err(failure) => match call.next_delay(failure, attempt, cancel) {
                    Ok((delay, last_error)) => match cancel {
                        Some(token) => {
                            tokio::select! {
                                biased;
                                () = token.cancelled() => {
                                    return call.fail(NonRetriableError::cancelled(last_error));
                                }
                                () = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => {
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                        }
                    },
                    Err(error) => return call.fail(error),
                },
            }
            attempt += 1;
        }
    }
}

impl fmt::Debug for Retry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("backoff", &self.backoff)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

/// Bookkeeping for one call through a [`Retry`].
struct CallState<'a> {
    retry: &'a Retry,
    span: RetrySpan,
    metrics: RetryMetrics,
}

impl<'a> CallState<'a> {
    fn begin(retry: &'a Retry, operation_name: &str) -> Self {
        retry.budget.deposit();
        let span = RetryTracer::new().start_retry_span(operation_name, retry.backoff.len());
        Self { retry, span, metrics: RetryMetrics::new() }
    }

    fn before_attempt(&mut self, attempt: u32) {
        self.metrics.attempts = attempt + 1;
        self.span.record_attempt(attempt);
    }

    fn succeed<T, E>(mut self, value: T) -> RetryResultWithMetrics<T, E> {
        self.metrics.succeeded = true;
        self.span.record_success(self.metrics.attempts, self.metrics.total_delay);
        (Ok(value), self.metrics)
    }

    fn fail<T, E>(mut self, error: NonRetriableError<E>) -> RetryResultWithMetrics<T, E> {
        self.metrics.terminal = Some(error.kind());
        self.span.record_terminal(error.kind(), self.metrics.attempts, &error);
        (Err(error), self.metrics)
    }

    /// Delay before the next attempt, or the error ending the call.
    ///
    /// On success the budget has already paid for the retry. A token
    /// cancelled before then ends the call without charging the budget; one
    /// cancelled during the sleep that follows does not refund it.
    fn next_delay<E>(
        &mut self,
        failure: OperationError<E>,
        attempt: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<(Duration, E), NonRetriableError<E>>
    where
        E: StdError + 'static,
    {
        let error = match failure {
            OperationError::Terminal(terminal) => return Err(terminal),
            OperationError::Failed(error) => error,
        };
        self.span.record_failure(attempt, &error);

        let Some(&delay) = self.retry.backoff.get(attempt as usize) else {
            return Err(NonRetriableError::limit_reached(self.retry.backoff.len(), error));
        };
        if !self.retry.policy.decide(&error, attempt) {
            return Err(NonRetriableError::rejected_by_policy(error));
        }
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(NonRetriableError::cancelled(error));
        }
        if !self.retry.budget.try_withdraw() {
            return Err(NonRetriableError::budget_exhausted(error));
        }

        self.metrics.retries += 1;
        self.metrics.total_delay += delay;
        self.span.record_backoff(attempt, delay);
        Ok((delay, error))
    }
}

enum BackoffSource {
    Secs(Vec<f64>),
    Durations(Vec<Duration>),
}

/// Builder for [`Retry`]
///
/// Only the backoff schedule is required. The policy defaults to
/// [`RetryPolicies::always`]; the budget defaults to
/// [`RetryBudgets::create_default`] on the configured clock, or on the
/// system clock when none is given.
#[derive(Default)]
pub struct RetryBuilder {
    backoff: Option<BackoffSource>,
    policy: Option<SharedRetryPolicy>,
    budget: Option<SharedRetryBudget>,
    clock: Option<Arc<dyn Clock>>,
}

impl RetryBuilder {
    /// A builder with no schedule and default policy and budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// `num_retries` retries, each preceded by `delay_secs` seconds.
    #[must_use]
    pub fn constant_backoff(mut self, num_retries: usize, delay_secs: f64) -> Self {
        self.backoff = Some(BackoffSource::Secs(vec![delay_secs; num_retries]));
        self
    }

    /// One retry per entry, each preceded by that many seconds.
    #[must_use]
    pub fn backoff_secs(mut self, delays_secs: &[f64]) -> Self {
        self.backoff = Some(BackoffSource::Secs(delays_secs.to_vec()));
        self
    }

    /// One retry per entry, each preceded by that delay.
    #[must_use]
    pub fn backoff(mut self, delays: Vec<Duration>) -> Self {
        self.backoff = Some(BackoffSource::Durations(delays));
        self
    }

    /// Policy deciding which failures are retried.
    #[must_use]
    pub fn policy(mut self, policy: SharedRetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Budget shared with every other holder of it.
    #[must_use]
    pub fn budget(mut self, budget: SharedRetryBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Clock for the default budget. Ignored when a budget is supplied.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and build the retry.
    ///
    /// # Errors
    ///
    /// - [`RetryBuildError::EmptyBackoff`] when no schedule was set or it has
    ///   no entries.
    /// - [`RetryBuildError::InvalidDelay`] for a negative, NaN or
    ///   unrepresentable delay.
    pub fn build(self) -> Result<Retry, RetryBuildError> {
        let backoff = match self.backoff {
            None => return Err(RetryBuildError::EmptyBackoff),
            Some(BackoffSource::Durations(delays)) => delays,
            Some(BackoffSource::Secs(secs)) => secs
                .iter()
                .enumerate()
                .map(|(index, &value)| {
                    Duration::try_from_secs_f64(value)
                        .map_err(|_| RetryBuildError::InvalidDelay { index, value })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        if backoff.is_empty() {
            return Err(RetryBuildError::EmptyBackoff);
        }

        let policy = self.policy.unwrap_or_else(RetryPolicies::always);
        let budget = match (self.budget, self.clock) {
            (Some(budget), _) => budget,
            (None, Some(clock)) => RetryBudgets::create_default(clock)?,
            (None, None) => RetryBudgets::system_default()?,
        };

        Ok(Retry { backoff: backoff.into(), policy, budget })
    }
}

impl fmt::Debug for RetryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backoff_len = self.backoff.as_ref().map(|source| match source {
            BackoffSource::Secs(secs) => secs.len(),
            BackoffSource::Durations(delays) => delays.len(),
        });
        f.debug_struct("RetryBuilder")
            .field("backoff_len", &backoff_len)
            .field("policy", &self.policy.is_some())
            .field("budget", &self.budget)
            .field("clock", &self.clock.is_some())
            .finish()
    }
}
