//! Common error types shared by the tollgate crates.
//!
//! # Error Handling Architecture
//!
//! 1. **`CommonError`**: the error patterns every module can hit: bad
//!    configuration, invalid input, unparsable config documents, I/O while
//!    reading configuration, and internal invariant violations.
//!
//! 2. **`ErrorClassification` trait**: a standard interface for classifying
//!    errors by retryability, severity and criticality.
//!
//! 3. **`ErrorSeverity` enum**: a unified severity scale for logging.
//!
//! ## Composition
//!
//! Module-specific errors embed `CommonError` rather than duplicating its
//! variants:
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum BudgetError {
//!     #[error("retry budget ttl {ttl_ms}ms outside [{min_ms}, {max_ms}]")]
//!     TtlOutOfRange { ttl_ms: u64, min_ms: u64, max_ms: u64 },
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//!
//! impl_error_classification!(
//!     BudgetError,
//!     Common,
//!     Self::TtlOutOfRange { .. } => {
//!         retryable: false,
//!         severity: ErrorSeverity::Error,
//!         critical: false,
//!     },
//! );
//! ```
//!
//! ## ErrorSeverity Levels
//!
//! | Level | Use Case |
//! |-------|----------|
//! | **Info** | Expected conditions |
//! | **Warning** | Degraded but operational |
//! | **Error** | Failure requiring attention (bad configuration, bad input) |
//! | **Critical** | Internal invariant violated |

use std::time::Duration;

use thiserror::Error;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Common error variants that appear across multiple modules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    /// Configuration-related errors
    #[error("{}", config_message(.message, .field.as_deref()))]
    Config { message: String, field: Option<String> },

    /// Validation errors for a single argument
    #[error("{}", validation_message(.field, .message, .value.as_deref()))]
    Validation { field: String, message: String, value: Option<String> },

    /// Serialization or deserialization errors
    #[error("Serialization error ({format}): {message}")]
    Serialization { message: String, format: String },

    /// Filesystem errors while reading configuration
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn config_message(message: &str, field: Option<&str>) -> String {
    match field {
        Some(field) => format!("Configuration error in field '{field}': {message}"),
        None => format!("Configuration error: {message}"),
    }
}

fn validation_message(field: &str, message: &str, value: Option<&str>) -> String {
    match value {
        Some(value) => {
            format!("Validation error for field '{field}' (value: '{value}'): {message}")
        }
        None => format!("Validation error for field '{field}': {message}"),
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. }
            | Self::Validation { .. }
            | Self::Serialization { .. }
            | Self::Persistence { .. } => ErrorSeverity::Error,
            Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl CommonError {
    /// Create a simple configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Create a configuration error for a specific field
    pub fn config_field<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create a validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation { field: field.into(), message: message.into(), value: None }
    }

    /// Create a validation error with the invalid value
    pub fn validation_with_value<F, M, V>(field: F, message: M, value: V) -> Self
    where
        F: Into<String>,
        M: Into<String>,
        V: ToString,
    {
        Self::Validation {
            field: field.into(),
            message: message.into(),
            value: Some(value.to_string()),
        }
    }

    /// Create a serialization error for the given format
    pub fn serialization_format<F: Into<String>, S: Into<String>>(format: F, message: S) -> Self {
        Self::Serialization { message: message.into(), format: format.into() }
    }

    /// Create a persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Name of the field this error refers to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Config { field, .. } => field.as_deref(),
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Error classification trait for consistent error handling across modules
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Configuration and validation failures never are: retrying a call with
    /// the same arguments yields the same error.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for logging and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence(err.to_string())
    }
}

impl From<toml::de::Error> for CommonError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization_format("TOML", err.to_string())
    }
}

impl From<toml::ser::Error> for CommonError {
    fn from(err: toml::ser::Error) -> Self {
        Self::serialization_format("TOML", err.to_string())
    }
}

/// Implement `ErrorClassification` for a module error that embeds
/// `CommonError` in a `Common` style variant.
///
/// Every non-common variant is listed with its classification; the common
/// variant delegates.
///
/// ```rust,ignore
/// impl_error_classification!(
///     TokenBucketError,
///     Common,
///     Self::InvalidAmount { .. } => {
///         retryable: false,
///         severity: ErrorSeverity::Error,
///         critical: false,
///     },
/// );
/// ```
#[macro_export]
macro_rules! impl_error_classification {
    (
        $error_type:ty,
        $common_variant:ident
        $(,
            $variant:pat => {
                retryable: $retryable:expr,
                severity: $severity:expr,
                critical: $critical:expr
                $(, retry_after: $retry_after:expr)?
                $(,)?
            }
        )*
        $(,)?
    ) => {
        impl $crate::error::ErrorClassification for $error_type {
            fn is_retryable(&self) -> bool {
                match self {
                    Self::$common_variant(e) => e.is_retryable(),
                    $(
                        $variant => $retryable,
                    )*
                }
            }

            fn severity(&self) -> $crate::error::ErrorSeverity {
                match self {
                    Self::$common_variant(e) => e.severity(),
                    $(
                        $variant => $severity,
                    )*
                }
            }

            fn is_critical(&self) -> bool {
                match self {
                    Self::$common_variant(e) => e.is_critical(),
                    $(
                        $variant => $critical,
                    )*
                }
            }

            fn retry_after(&self) -> Option<std::time::Duration> {
                match self {
                    Self::$common_variant(e) => e.retry_after(),
                    $(
                        $(
                            $variant => $retry_after,
                        )?
                    )*
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }
    };
}
