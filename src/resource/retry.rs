use std::time::Duration;

use crate::classifier::{ClassifiedError, ErrorKind};

/// Base delay of the exponential backoff.
pub const BASE_DELAY: Duration = Duration::from_millis(1000);
/// Additional attempts after the first failure.
pub const MAX_RETRIES: u32 = 2;

/// RetryPolicy
///
/// Bounded exponential backoff: `delay(n) = min(base * 2^n, max_delay)` before the
/// n-th retry (0-based). The ceiling is chosen per resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn with_ceiling(max_delay: Duration) -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: BASE_DELAY,
            max_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// should_retry
    ///
    /// Timeouts may already be executing server-side and auth failures need a new
    /// session, so neither is ever retried. Every other kind retries while attempts
    /// remain.
    pub fn should_retry(&self, error: &ClassifiedError, attempt: u32) -> bool {
        !matches!(error.kind, ErrorKind::Auth | ErrorKind::Timeout) && attempt < self.max_retries
    }
}
