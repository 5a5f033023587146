//! Tracing instrumentation for retried calls
//!
//! Uses the standard `tracing` crate. Routine progress is logged at `debug`,
//! successes after at least one retry at `info`, and terminal outcomes at
//! `warn`.

use std::fmt::Display;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::NonRetriableKind;

/// Entry point for retry instrumentation
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryTracer;

impl RetryTracer {
    /// Create a new retry tracer
    pub fn new() -> Self {
        Self
    }

    /// Start a span for one retried call
    pub fn start_retry_span(&self, operation_name: &str, max_retries: usize) -> RetrySpan {
        debug!(operation = operation_name, max_retries, "Starting retry operation");

        RetrySpan { operation_name: operation_name.to_string(), max_retries }
    }
}

/// One retried call
#[derive(Debug)]
pub struct RetrySpan {
    operation_name: String,
    max_retries: usize,
}

impl RetrySpan {
    /// Name given to the call.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Record the start of an attempt
    pub fn record_attempt(&mut self, attempt: u32) {
        debug!(operation = %self.operation_name, attempt, "Retry attempt");
    }

    /// Record a failed attempt that will be considered for retry
    pub fn record_failure(&mut self, attempt: u32, error: &dyn Display) {
        debug!(
            operation = %self.operation_name,
            attempt,
            error = %error,
            "Retry attempt failed"
        );
    }

    /// Record the backoff before the next attempt
    pub fn record_backoff(&mut self, attempt: u32, delay: Duration) {
        debug!(
            operation = %self.operation_name,
            attempt,
            delay_ms = delay.as_millis(),
            "Backing off before retry"
        );
    }

    /// Record a successful call
    pub fn record_success(&mut self, attempts: u32, total_delay: Duration) {
        if attempts > 1 {
            info!(
                operation = %self.operation_name,
                attempts,
                total_delay_ms = total_delay.as_millis(),
                "Retry operation succeeded"
            );
        } else {
            debug!(operation = %self.operation_name, "Operation succeeded on first attempt");
        }
    }

    /// Record why the call stopped retrying
    pub fn record_terminal(&mut self, kind: NonRetriableKind, attempts: u32, error: &dyn Display) {
        match kind {
            NonRetriableKind::LimitReached => warn!(
                operation = %self.operation_name,
                max_retries = self.max_retries,
                attempts,
                error = %error,
                "All retry attempts exhausted"
            ),
            NonRetriableKind::RejectedByPolicy => warn!(
                operation = %self.operation_name,
                attempts,
                error = %error,
                "Retry policy rejected failure"
            ),
            NonRetriableKind::BudgetExhausted => warn!(
                operation = %self.operation_name,
                attempts,
                error = %error,
                "Retry budget exhausted, aborting retry"
            ),
            NonRetriableKind::Cancelled => warn!(
                operation = %self.operation_name,
                attempts,
                "Retry cancelled during backoff"
            ),
            NonRetriableKind::Aborted => warn!(
                operation = %self.operation_name,
                attempts,
                error = %error,
                "Operation aborted retrying"
            ),
        }
    }
}
