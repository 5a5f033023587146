//! Bounded retries gated by a policy and a shared budget.
//!
//! [`Retry`] is the executor; [`RetryPolicy`] decides which failures are
//! worth retrying; the [`RetryBudget`](crate::budget::RetryBudget) decides
//! whether the process can afford another retry right now.

mod error;
mod executor;
pub mod metrics;
mod policy;
pub mod tracing;

pub use error::{NonRetriableError, NonRetriableKind, OperationError, RetryBuildError};
pub use executor::{Retry, RetryBuilder, RetryResultWithMetrics};
pub use metrics::RetryMetrics;
pub use policy::{Always, InstanceOf, Never, RetryPolicies, RetryPolicy, SharedRetryPolicy};
