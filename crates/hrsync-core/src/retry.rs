//! Retry policy for failed events.
//!
//! A failed event either stays `Failed` for manual re-enqueue (`Terminal`)
//! or is returned to `Pending` after an exponential backoff until it has
//! failed `max_retries` times (`Requeue`).

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Largest backoff exponent; keeps `2^n` comfortably inside `u32`.
const MAX_BACKOFF_EXPONENT: u32 = 30;

/// What happens to an event after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Failed events stay `Failed`; only an operator re-enqueues them.
    #[default]
    Terminal,
    /// Failed events are requeued with exponential backoff.
    Requeue {
        /// Failures after which an event is left `Failed` for good.
        max_retries: i32,
        /// Delay before the first retry.
        base_delay: Duration,
        /// Upper bound on any single delay.
        max_delay: Duration,
    },
}

impl RetryPolicy {
    /// When an event that now has `retry_count` failures may be attempted
    /// again, or `None` if it is terminal.
    ///
    /// A delay past the representable range saturates to the latest
    /// representable instant, so the event stays retryable.
    #[must_use]
    pub fn next_attempt_at(&self, retry_count: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Self::Terminal => None,
            Self::Requeue {
                max_retries,
                base_delay,
                max_delay,
            } => {
                if retry_count >= max_retries {
                    return None;
                }
                let delay = backoff(retry_count, base_delay, max_delay);
                let delta = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
                Some(now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC))
            }
        }
    }

    /// The retry ceiling to requeue under, or `None` when requeueing is off.
    #[must_use]
    pub fn requeue_limit(&self) -> Option<i32> {
        match *self {
            Self::Terminal => None,
            Self::Requeue { max_retries, .. } => Some(max_retries),
        }
    }
}

/// `base * 2^(retry_count - 1)`, capped at `max`.
fn backoff(retry_count: i32, base: Duration, max: Duration) -> Duration {
    let exponent = u32::try_from(retry_count.saturating_sub(1))
        .unwrap_or(0)
        .min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(2_u32.pow(exponent)).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn requeue(max_retries: i32) -> RetryPolicy {
        RetryPolicy::Requeue {
            max_retries,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_terminal_policy_never_schedules_a_retry() {
        assert_eq!(RetryPolicy::Terminal.next_attempt_at(1, now()), None);
        assert_eq!(RetryPolicy::Terminal.requeue_limit(), None);
    }

    #[test]
    fn test_requeue_policy_backs_off_exponentially() {
        let policy = requeue(10);

        assert_eq!(
            policy.next_attempt_at(1, now()),
            Some(now() + TimeDelta::seconds(30))
        );
        assert_eq!(
            policy.next_attempt_at(2, now()),
            Some(now() + TimeDelta::seconds(60))
        );
        assert_eq!(
            policy.next_attempt_at(3, now()),
            Some(now() + TimeDelta::seconds(120))
        );
    }

    #[test]
    fn test_requeue_policy_caps_delay() {
        let policy = requeue(100);

        assert_eq!(
            policy.next_attempt_at(50, now()),
            Some(now() + TimeDelta::seconds(300))
        );
    }

    #[test]
    fn test_requeue_policy_saturates_unrepresentable_delay() {
        let policy = RetryPolicy::Requeue {
            max_retries: 5,
            base_delay: Duration::from_secs(u64::MAX),
            max_delay: Duration::from_secs(u64::MAX),
        };

        assert_eq!(
            policy.next_attempt_at(1, now()),
            Some(DateTime::<Utc>::MAX_UTC)
        );
        assert_eq!(
            policy.next_attempt_at(4, now()),
            Some(DateTime::<Utc>::MAX_UTC)
        );
    }

    #[test]
    fn test_requeue_policy_stops_at_max_retries() {
        let policy = requeue(3);

        assert!(policy.next_attempt_at(2, now()).is_some());
        assert_eq!(policy.next_attempt_at(3, now()), None);
        assert_eq!(policy.requeue_limit(), Some(3));
    }
}
