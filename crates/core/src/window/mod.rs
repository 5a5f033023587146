//! Concurrent summation over a sliding time window.
//!
//! - [`StripedAdder`]: lock-free signed accumulator with per-thread cells
//! - [`WindowedAdder`]: a ring of sub-window sums rotated lazily on access

mod adder;
mod striped;

pub use adder::WindowedAdder;
pub use striped::StripedAdder;
use thiserror::Error;
use tollgate_common::{impl_error_classification, CommonError, ErrorClassification, ErrorSeverity};

/// Errors raised while constructing a [`WindowedAdder`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    /// The range divided by the slice count rounds down to zero milliseconds.
    #[error("range of {range_ms}ms cannot be split into {slices} slices of at least 1ms")]
    SliceTooNarrow { range_ms: u64, slices: usize },

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_classification!(
    WindowError,
    Common,
    Self::SliceTooNarrow { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
);
