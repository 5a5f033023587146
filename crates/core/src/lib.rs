//! # Tollgate Core
//!
//! In-process resilience primitives for callers of a shared dependency.
//!
//! This crate contains:
//! - [`window`]: concurrent sums over a sliding time window
//! - [`bucket`]: bounded and leaky token buckets
//! - [`budget`]: retry budgets that cap retries as a share of traffic
//! - [`retry`]: a bounded retry executor gated by a policy and a budget
//! - [`config`]: TOML and environment configuration for the above
//!
//! ## Architecture Principles
//! - Only depends on `tollgate-common` for errors and the clock
//! - Every time-dependent type takes its [`Clock`](tollgate_common::time::Clock)
//!   at construction
//! - Shared state is lock-free and safe to use from many threads

pub mod bucket;
pub mod budget;
pub mod config;
pub mod retry;
pub mod window;

pub use bucket::{BoundedTokenBucket, LeakyTokenBucket, TokenBucket, TokenBucketError};
pub use budget::{BudgetError, BudgetKind, RetryBudget, RetryBudgets, SharedRetryBudget};
pub use config::{BackoffConfig, PolicyConfig, RetryBudgetConfig, RetryConfig};
pub use retry::{
    NonRetriableError, NonRetriableKind, OperationError, Retry, RetryBuildError, RetryBuilder,
    RetryPolicies, RetryPolicy,
};
pub use window::{StripedAdder, WindowError, WindowedAdder};
