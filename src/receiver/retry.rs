use std::sync::Arc;
use std::time::Duration;

/// What to do with a message whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hide the message for this long, then let the queue redeliver it.
    RetryAfter(Duration),
    /// No schedule entry left for this attempt.
    Exhausted,
}

/// Ordered list of visibility extensions, one per failed attempt.
///
/// A failure on attempt `n` (1 = first delivery) uses entry `n - 1`. With a
/// schedule of `[1s, 5s, 30s]` the message is retried three times and
/// deleted when the fourth attempt fails. An empty schedule never retries.
///
/// Cheap to clone; every processor shares the same list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    schedule: Arc<[Duration]>,
}

impl RetryPolicy {
    pub fn new(schedule: impl Into<Vec<Duration>>) -> Self {
        let schedule: Vec<Duration> = schedule.into();
        RetryPolicy {
            schedule: schedule.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.schedule.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedule.is_empty()
    }

    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }

    pub fn decide(&self, attempt: u32) -> RetryDecision {
        let index = attempt.saturating_sub(1) as usize;
        match self.schedule.get(index) {
            Some(delay) => RetryDecision::RetryAfter(*delay),
            None => RetryDecision::Exhausted,
        }
    }
}

impl From<Vec<Duration>> for RetryPolicy {
    fn from(schedule: Vec<Duration>) -> Self {
        RetryPolicy::new(schedule)
    }
}

impl From<&[Duration]> for RetryPolicy {
    fn from(schedule: &[Duration]) -> Self {
        RetryPolicy::new(schedule.to_vec())
    }
}
