// Metrics for retry operations
use std::fmt;
use std::time::Duration;

use super::NonRetriableKind;

/// Metrics collected during one retried call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryMetrics {
    /// Number of times the operation was invoked
    pub attempts: u32,
    /// Number of retries the budget paid for
    pub retries: u32,
    /// Total backoff slept across all retries
    pub total_delay: Duration,
    /// Whether the operation ultimately succeeded
    pub succeeded: bool,
    /// Why retrying stopped, if the call failed
    pub terminal: Option<NonRetriableKind>,
}

impl RetryMetrics {
    /// Create new metrics with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the average delay between attempts
    pub fn average_delay(&self) -> Option<Duration> {
        if self.retries == 0 {
            None
        } else {
            Some(self.total_delay / self.retries)
        }
    }
}

impl fmt::Display for RetryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryMetrics {{ attempts: {}, retries: {}, total_delay: {:?}, succeeded: {}",
            self.attempts, self.retries, self.total_delay, self.succeeded
        )?;
        if let Some(kind) = self.terminal {
            write!(f, ", terminal: {kind}")?;
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `RetryMetrics::average_delay` behavior for the average delay
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `None` without retries.
    /// - Confirms the mean over retries otherwise.
    #[test]
    fn test_average_delay() {
        let mut metrics = RetryMetrics::new();
        assert_eq!(metrics.average_delay(), None);

        metrics.retries = 2;
        metrics.total_delay = Duration::from_millis(300);
        assert_eq!(metrics.average_delay(), Some(Duration::from_millis(150)));
    }

    /// Validates `RetryMetrics` display behavior.
    #[test]
    fn test_display() {
        let metrics = RetryMetrics {
            attempts: 4,
            retries: 3,
            total_delay: Duration::ZERO,
            succeeded: false,
            terminal: Some(NonRetriableKind::LimitReached),
        };
        assert_eq!(
            metrics.to_string(),
            "RetryMetrics { attempts: 4, retries: 3, total_delay: 0ns, succeeded: false, \
             terminal: limit_reached }"
        );
    }
}
