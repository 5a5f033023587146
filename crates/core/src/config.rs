//! Retry configuration
//!
//! Describes a [`Retry`] and its budget in TOML, with environment overrides
//! for the budget parameters.
//!
//! ```toml
//! policy = "always"
//!
//! [backoff]
//! type = "constant"
//! num_retries = 3
//! delay_secs = 0.25
//!
//! [budget]
//! ttl_ms = 10000
//! min_retries_per_second = 10
//! percent_can_retry = 0.2
//! ```
//!
//! ## Environment Variables
//! - `TOLLGATE_BUDGET_TTL_MS`: deposit lifetime in milliseconds
//! - `TOLLGATE_BUDGET_MIN_RETRIES_PER_SECOND`: retry rate floor
//! - `TOLLGATE_BUDGET_PERCENT_CAN_RETRY`: retries allowed per deposit

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tollgate_common::time::Clock;
use tollgate_common::CommonError;
use tracing::{debug, info};

use crate::budget::{self, constants, BudgetError, RetryBudgets, SharedRetryBudget};
use crate::retry::{Retry, RetryBuildError, RetryPolicies};

/// Overrides [`RetryBudgetConfig::ttl_ms`].
pub const ENV_BUDGET_TTL_MS: &str = "TOLLGATE_BUDGET_TTL_MS";
/// Overrides [`RetryBudgetConfig::min_retries_per_second`].
pub const ENV_BUDGET_MIN_RETRIES_PER_SECOND: &str = "TOLLGATE_BUDGET_MIN_RETRIES_PER_SECOND";
/// Overrides [`RetryBudgetConfig::percent_can_retry`].
pub const ENV_BUDGET_PERCENT_CAN_RETRY: &str = "TOLLGATE_BUDGET_PERCENT_CAN_RETRY";

/// Parameters of a token retry budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryBudgetConfig {
    /// Lifetime of a deposit, in `[1000, 60000]` milliseconds.
    pub ttl_ms: u64,
    /// Signed so that a negative value in a file is reported rather than
    /// failing to parse.
    pub min_retries_per_second: i64,
    /// Retries allowed per deposit, in `[0, 1000]`.
    pub percent_can_retry: f64,
}

impl Default for RetryBudgetConfig {
    fn default() -> Self {
        Self {
            ttl_ms: constants::DEFAULT_TTL_MS,
            min_retries_per_second: i64::from(constants::DEFAULT_MIN_RETRIES_PER_SECOND),
            percent_can_retry: constants::DEFAULT_PERCENT_CAN_RETRY,
        }
    }
}

impl RetryBudgetConfig {
    /// Check every parameter without building anything.
    ///
    /// # Errors
    ///
    /// The same [`BudgetError`] that [`RetryBudgets::create`] would return.
    pub fn validate(&self) -> Result<(), BudgetError> {
        let min = self.min_retries()?;
        budget::token_amounts(self.ttl_ms, min, self.percent_can_retry).map(|_| ())
    }

    /// Build the budget on `clock`.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn build<C: Clock>(&self, clock: C) -> Result<SharedRetryBudget, BudgetError> {
        RetryBudgets::create(self.ttl_ms, self.min_retries()?, self.percent_can_retry, clock)
    }

    fn min_retries(&self) -> Result<u32, BudgetError> {
        u32::try_from(self.min_retries_per_second).map_err(|_| {
            CommonError::validation_with_value(
                "min_retries_per_second",
                "must be between 0 and 4294967295",
                self.min_retries_per_second,
            )
            .into()
        })
    }
}

/// Backoff schedule of a [`Retry`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffConfig {
    /// `num_retries` retries separated by the same delay.
    Constant {
        /// Retries after the first attempt.
        num_retries: usize,
        /// Seconds before each retry; zero when omitted.
        #[serde(default)]
        delay_secs: f64,
    },
    /// One retry per listed delay.
    Explicit {
        /// Seconds before each retry, in order.
        delays_secs: Vec<f64>,
    },
}

/// Built-in retry policies selectable from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyConfig {
    /// [`RetryPolicies::always`]
    #[default]
    Always,
    /// [`RetryPolicies::never`]
    Never,
}

/// Full description of a [`Retry`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay schedule; its length is the retry limit.
    pub backoff: BackoffConfig,
    /// Defaults to `always`.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Uses the default budget when absent.
    #[serde(default)]
    pub budget: Option<RetryBudgetConfig>,
}

impl RetryConfig {
    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// [`CommonError::Serialization`] when the document is not valid TOML or
    /// does not describe a retry.
    pub fn from_toml_str(contents: &str) -> Result<Self, CommonError> {
        Ok(toml::from_str(contents)?)
    }

    /// Read and parse a TOML configuration file.
    ///
    /// # Errors
    ///
    /// [`CommonError::Config`] when the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, CommonError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading retry configuration from file");

        let contents = std::fs::read_to_string(path).map_err(|e| {
            CommonError::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Override budget parameters from `TOLLGATE_BUDGET_*` variables.
    ///
    /// Setting any of them enables a budget section, starting from the
    /// defaults, when the configuration had none.
    ///
    /// # Errors
    ///
    /// [`CommonError::Config`] naming the variable when a value does not
    /// parse.
    pub fn apply_env_overrides(&mut self) -> Result<(), CommonError> {
        let ttl_ms = env_parse::<u64>(ENV_BUDGET_TTL_MS)?;
        let min_retries = env_parse::<i64>(ENV_BUDGET_MIN_RETRIES_PER_SECOND)?;
        let percent = env_parse::<f64>(ENV_BUDGET_PERCENT_CAN_RETRY)?;

        if ttl_ms.is_none() && min_retries.is_none() && percent.is_none() {
            return Ok(());
        }

        let budget = self.budget.get_or_insert_with(RetryBudgetConfig::default);
        if let Some(ttl_ms) = ttl_ms {
            budget.ttl_ms = ttl_ms;
        }
        if let Some(min_retries) = min_retries {
            budget.min_retries_per_second = min_retries;
        }
        if let Some(percent) = percent {
            budget.percent_can_retry = percent;
        }
        debug!(budget = ?budget, "Applied retry budget environment overrides");
        Ok(())
    }

    /// Build the configured retry. `clock` drives the budget.
    ///
    /// # Errors
    ///
    /// [`RetryBuildError`] for an invalid schedule or budget.
    pub fn build(&self, clock: Arc<dyn Clock>) -> Result<Retry, RetryBuildError> {
        let builder = match &self.backoff {
            BackoffConfig::Constant { num_retries, delay_secs } => {
                Retry::builder().constant_backoff(*num_retries, *delay_secs)
            }
            BackoffConfig::Explicit { delays_secs } => Retry::builder().backoff_secs(delays_secs),
        };
        let builder = builder.policy(match self.policy {
            PolicyConfig::Always => RetryPolicies::always(),
            PolicyConfig::Never => RetryPolicies::never(),
        });
        let builder = match &self.budget {
            Some(budget) => builder.budget(budget.build(clock)?),
            None => builder.clock(clock),
        };
        builder.build()
    }
}

/// Parse an optional environment variable.
///
/// # Errors
/// Returns `CommonError::Config` if the variable is set but does not parse.
fn env_parse<T>(key: &str) -> Result<Option<T>, CommonError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| CommonError::config_field(key, format!("Invalid value {raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
