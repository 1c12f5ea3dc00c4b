use std::time::Duration;

use super::limiter::DispatchLimiter;
use super::retry::RetryPolicy;

pub const DEFAULT_MAX_BATCH_SIZE: i32 = 10;
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_WAIT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_FETCH_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// SQS accepts between 1 and 10 messages per `ReceiveMessage` call.
const MAX_BATCH_SIZE_LIMIT: i32 = 10;
/// SQS long polling waits at most 20 seconds.
const MAX_POLL_WAIT: Duration = Duration::from_secs(20);

/// Configuration for one consumer run.
///
/// Captured once when the poll loop starts and never changed afterwards.
/// Zero values are replaced by the defaults (see [`ReceiveOptions::normalized`]).
///
/// # Fields
/// - `max_batch_size`: messages requested per `ReceiveMessage` call (default 10).
/// - `visibility_timeout`: invisibility window granted on fetch (default 60s).
/// - `poll_wait`: long-poll wait per fetch (default 5s).
/// - `concurrency`: maximum number of handlers running at once (default 5,
///   capped at [`DispatchLimiter::MAX_CAPACITY`]).
/// - `retry_schedule`: visibility extension per failed attempt, see [`RetryPolicy`].
///   SQS counts in whole seconds, so entries are rounded up.
/// - `fetch_error_backoff`: pause after a failed fetch (default 2s).
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveOptions {
    pub max_batch_size: i32,
    pub visibility_timeout: Duration,
    pub poll_wait: Duration,
    pub concurrency: usize,
    pub retry_schedule: RetryPolicy,
    pub fetch_error_backoff: Duration,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        ReceiveOptions {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            poll_wait: DEFAULT_POLL_WAIT,
            concurrency: DEFAULT_CONCURRENCY,
            retry_schedule: RetryPolicy::default(),
            fetch_error_backoff: DEFAULT_FETCH_ERROR_BACKOFF,
        }
    }
}

impl ReceiveOptions {
    pub fn with_max_batch_size(mut self, max_batch_size: i32) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    pub fn with_poll_wait(mut self, poll_wait: Duration) -> Self {
        self.poll_wait = poll_wait;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_retry_schedule(mut self, schedule: impl Into<RetryPolicy>) -> Self {
        self.retry_schedule = schedule.into();
        self
    }

    pub fn with_fetch_error_backoff(mut self, backoff: Duration) -> Self {
        self.fetch_error_backoff = backoff;
        self
    }

    /// Fills zero values with defaults and clamps to what SQS accepts.
    pub fn normalized(mut self) -> Self {
        if self.max_batch_size <= 0 {
            self.max_batch_size = DEFAULT_MAX_BATCH_SIZE;
        }
        self.max_batch_size = self.max_batch_size.min(MAX_BATCH_SIZE_LIMIT);

        if self.visibility_timeout.is_zero() {
            self.visibility_timeout = DEFAULT_VISIBILITY_TIMEOUT;
        }
        if self.poll_wait.is_zero() {
            self.poll_wait = DEFAULT_POLL_WAIT;
        }
        self.poll_wait = self.poll_wait.min(MAX_POLL_WAIT);

        if self.concurrency == 0 {
            self.concurrency = DEFAULT_CONCURRENCY;
        }
        self.concurrency = self.concurrency.min(DispatchLimiter::MAX_CAPACITY);
        if self.fetch_error_backoff.is_zero() {
            self.fetch_error_backoff = DEFAULT_FETCH_ERROR_BACKOFF;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = ReceiveOptions::default();
        assert_eq!(opts.max_batch_size, 10);
        assert_eq!(opts.visibility_timeout, Duration::from_secs(60));
        assert_eq!(opts.poll_wait, Duration::from_secs(5));
        assert_eq!(opts.concurrency, 5);
        assert!(opts.retry_schedule.is_empty());
    }

    #[test]
    fn normalized_replaces_zero_values() {
        let opts = ReceiveOptions {
            max_batch_size: 0,
            visibility_timeout: Duration::ZERO,
            poll_wait: Duration::ZERO,
            concurrency: 0,
            retry_schedule: RetryPolicy::default(),
            fetch_error_backoff: Duration::ZERO,
        }
        .normalized();

        assert_eq!(opts, ReceiveOptions::default());
    }

    #[test]
    fn normalized_clamps_to_sqs_limits() {
        let opts = ReceiveOptions::default()
            .with_max_batch_size(50)
            .with_poll_wait(Duration::from_secs(60))
            .normalized();

        assert_eq!(opts.max_batch_size, 10);
        assert_eq!(opts.poll_wait, Duration::from_secs(20));
    }

    #[test]
    fn normalized_caps_concurrency() {
        let opts = ReceiveOptions::default()
            .with_concurrency(usize::MAX)
            .normalized();

        assert_eq!(opts.concurrency, DispatchLimiter::MAX_CAPACITY);
    }

    #[test]
    fn builder_keeps_explicit_values() {
        let opts = ReceiveOptions::default()
            .with_concurrency(2)
            .with_visibility_timeout(Duration::from_secs(30))
            .with_retry_schedule(vec![Duration::from_secs(1)])
            .normalized();

        assert_eq!(opts.concurrency, 2);
        assert_eq!(opts.visibility_timeout, Duration::from_secs(30));
        assert_eq!(opts.retry_schedule.len(), 1);
    }
}
