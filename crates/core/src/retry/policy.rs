//! Retry eligibility policies.
//!
//! A policy looks at a failure and the zero-based index of the attempt that
//! produced it, and answers whether a retry may be considered. Policies are
//! stateless predicates; whether the retry actually happens is also up to the
//! backoff schedule and the budget.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Decides whether a failed attempt is eligible for a retry
pub trait RetryPolicy: Send + Sync {
    /// `attempt` is the index of the attempt that failed, starting at zero.
    fn decide(&self, error: &(dyn StdError + 'static), attempt: u32) -> bool;
}

impl<F> RetryPolicy for F
where
    F: Fn(&(dyn StdError + 'static), u32) -> bool + Send + Sync,
{
    fn decide(&self, error: &(dyn StdError + 'static), attempt: u32) -> bool {
        self(error, attempt)
    }
}

/// A policy shared by every [`Retry`](super::Retry) clone.
pub type SharedRetryPolicy = Arc<dyn RetryPolicy>;

/// Retries every failure
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl RetryPolicy for Always {
    fn decide(&self, _error: &(dyn StdError + 'static), _attempt: u32) -> bool {
        true
    }
}

/// Retries nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl RetryPolicy for Never {
    fn decide(&self, _error: &(dyn StdError + 'static), _attempt: u32) -> bool {
        false
    }
}

type TypeCheck = fn(&(dyn StdError + 'static)) -> bool;

/// Retries failures whose concrete type is one of a fixed set
///
/// ```
/// use std::io;
/// use std::num::ParseIntError;
///
/// use tollgate_core::retry::{InstanceOf, RetryPolicy};
///
/// let policy = InstanceOf::new().or::<io::Error>().or::<ParseIntError>();
/// let err = io::Error::other("reset");
/// assert!(policy.decide(&err, 0));
/// ```
#[derive(Clone, Default)]
pub struct InstanceOf {
    checks: Vec<(&'static str, TypeCheck)>,
}

impl InstanceOf {
    /// A policy matching nothing until types are added with [`or`](Self::or).
    pub fn new() -> Self {
        Self::default()
    }

    /// Also retry failures of type `T`.
    #[must_use]
    pub fn or<T: StdError + 'static>(mut self) -> Self {
        self.checks.push((std::any::type_name::<T>(), |error| error.is::<T>()));
        self
    }

    /// Names of the matched types, in insertion order.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.checks.iter().map(|(name, _)| *name)
    }
}

impl RetryPolicy for InstanceOf {
    fn decide(&self, error: &(dyn StdError + 'static), _attempt: u32) -> bool {
        self.checks.iter().any(|(_, check)| check(error))
    }
}

impl fmt::Debug for InstanceOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_names()).finish()
    }
}

/// Built-in policies
pub struct RetryPolicies;

impl RetryPolicies {
    /// Retry on every failure.
    pub fn always() -> SharedRetryPolicy {
        Arc::new(Always)
    }

    /// Never retry.
    pub fn never() -> SharedRetryPolicy {
        Arc::new(Never)
    }

    /// Retry only failures of type `T`; extend with [`InstanceOf::or`].
    pub fn instance_of<T: StdError + 'static>() -> InstanceOf {
        InstanceOf::new().or::<T>()
    }

    /// Wrap a closure taking the failure and the attempt index.
    pub fn from_fn<F>(decide: F) -> SharedRetryPolicy
    where
        F: Fn(&(dyn StdError + 'static), u32) -> bool + Send + Sync + 'static,
    {
        Arc::new(decide)
    }
}
