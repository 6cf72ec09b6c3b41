//! Retry policy for failed pushes.
//!
//! Failures are retried on a fixed backoff schedule indexed by the attempt
//! count. Once the attempt count reaches the maximum, the entry is failed
//! permanently and never scheduled again.

use crate::Timestamp;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// What to do after a failed push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry no earlier than the given time
    RetryAt(Timestamp),
    /// Attempts exhausted; fail permanently
    GiveUp,
}

/// A fixed, ordered backoff schedule with an attempt cap.
///
/// `delay_for(n)` returns the wait after the `n`-th failure (1-based).
/// Attempts beyond the schedule length saturate at the last delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Backoff delays in seconds, indexed by attempt number
    pub delays_secs: Vec<i64>,
    /// Attempt count at which an entry becomes permanently failed
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays_secs: vec![1, 5, 30, 120, 300],
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let idx = (attempts.max(1) as usize - 1).min(self.delays_secs.len() - 1);
        Duration::seconds(self.delays_secs[idx])
    }

    /// Decide the follow-up to a failure that raised the entry to `attempts`.
    pub fn next_attempt(&self, now: Timestamp, attempts: u32) -> RetryDecision {
        if attempts >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAt(now + self.delay_for(attempts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    #[test]
    fn schedule_matches_configuration() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::seconds(1));
        assert_eq!(policy.delay_for(2), Duration::seconds(5));
        assert_eq!(policy.delay_for(3), Duration::seconds(30));
        assert_eq!(policy.delay_for(4), Duration::seconds(120));
    }

    #[test]
    fn delay_saturates_at_last_entry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(5), Duration::seconds(300));
        assert_eq!(policy.delay_for(50), Duration::seconds(300));
    }

    #[test]
    fn gives_up_at_max_attempts() {
        let policy = RetryPolicy::default();
        let now = Utc::now();

        match policy.next_attempt(now, 4) {
            RetryDecision::RetryAt(at) => assert_eq!(at, now + Duration::seconds(120)),
            RetryDecision::GiveUp => panic!("should retry on attempt 4"),
        }
        assert_eq!(policy.next_attempt(now, 5), RetryDecision::GiveUp);
        assert_eq!(policy.next_attempt(now, 6), RetryDecision::GiveUp);
    }

    proptest! {
        #[test]
        fn prop_delays_never_decrease(a in 1u32..100, b in 1u32..100) {
            let policy = RetryPolicy::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(policy.delay_for(lo) <= policy.delay_for(hi));
        }

        #[test]
        fn prop_retry_time_is_in_the_future(attempts in 1u32..5) {
            let policy = RetryPolicy::default();
            let now = Utc::now();
            match policy.next_attempt(now, attempts) {
                RetryDecision::RetryAt(at) => prop_assert!(at > now),
                RetryDecision::GiveUp => prop_assert!(attempts >= policy.max_attempts),
            }
        }
    }
}
