use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default delay between attempts when a transition enables retry.
const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// Backoff strategy applied between transition attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Delay grows arithmetically: `delay * (attempt + 1)`.
    #[default]
    Linear,
    /// Delay doubles every attempt: `delay * 2^attempt`.
    Exponential,
}

/// Configuration for transition retry behavior.
///
/// A transition that fails (hook error or validation failure) is re-executed
/// as a whole (exit, action, validation, entry) up to `max_attempts`
/// additional times, waiting between attempts according to the backoff
/// strategy.
///
/// # Examples
///
/// ```
/// use praxis::core::{Backoff, RetryPolicy};
/// use std::time::Duration;
///
/// // No retry at all (the default).
/// let none = RetryPolicy::default();
/// assert_eq!(none.delay_for_attempt(0), None);
///
/// // Two extra attempts with exponential backoff: 10ms, then 20ms.
/// let policy = RetryPolicy {
///     max_attempts: 2,
///     backoff: Backoff::Exponential,
///     delay: Duration::from_millis(10),
/// };
/// assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(10)));
/// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(20)));
/// assert_eq!(policy.delay_for_attempt(2), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of additional attempts after the first one fails.
    ///
    /// `max_attempts = 2` means the transition runs at most 3 times.
    pub max_attempts: u32,

    /// Backoff strategy between attempts.
    pub backoff: Backoff,

    /// Base delay between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// No retries: fail on the first error.
    pub const NONE: Self = Self {
        max_attempts: 0,
        backoff: Backoff::Linear,
        delay: DEFAULT_DELAY,
    };

    /// Create a policy with the given number of additional attempts,
    /// keeping the default linear backoff and 1s base delay.
    pub const fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear,
            delay: DEFAULT_DELAY,
        }
    }

    /// Delay to wait after failed attempt `attempt` (0-indexed) before the
    /// next one, or `None` when the policy is exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let delay = match self.backoff {
            Backoff::Linear => self.delay.saturating_mul(attempt + 1),
            Backoff::Exponential => self.delay.saturating_mul(2u32.saturating_pow(attempt)),
        };

        Some(delay)
    }

    /// Total number of attempts this policy permits, first try included.
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    /// Default is no retry, matching a transition without a `retry` clause.
    fn default() -> Self {
        Self::NONE
    }
}

impl From<u32> for RetryPolicy {
    /// Shorthand for "this many extra attempts with default pacing".
    fn from(max_attempts: u32) -> Self {
        Self::with_max_attempts(max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_never_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy, RetryPolicy::NONE);
        assert_eq!(policy.max_attempts, 0);
        assert_eq!(policy.backoff, Backoff::Linear);
        assert_eq!(policy.delay, Duration::from_millis(1000));

        assert_eq!(policy.delay_for_attempt(0), None);
        assert_eq!(policy.delay_for_attempt(1), None);
        assert_eq!(policy.total_attempts(), 1);
    }

    #[test]
    fn linear_backoff_schedule() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Backoff::Linear,
            delay: Duration::from_millis(100),
        };

        // 100ms, 200ms, 300ms, then exhausted.
        assert_eq!(
            policy.delay_for_attempt(0),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            policy.delay_for_attempt(1),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            policy.delay_for_attempt(2),
            Some(Duration::from_millis(300))
        );
        assert_eq!(policy.delay_for_attempt(3), None);
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn exponential_backoff_schedule() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff: Backoff::Exponential,
            delay: Duration::from_millis(10),
        };

        // 10ms, 20ms, 40ms, 80ms, then exhausted.
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_millis(10)));
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(20)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(40)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(80)));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn with_max_attempts_keeps_defaults() {
        let policy = RetryPolicy::with_max_attempts(5);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, Backoff::Linear);
        assert_eq!(policy.delay, Duration::from_millis(1000));
        assert_eq!(policy.total_attempts(), 6);

        assert_eq!(policy, 5u32.into());
    }

    #[test]
    fn zero_delay_is_allowed() {
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff: Backoff::Exponential,
            delay: Duration::ZERO,
        };
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::ZERO));
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::ZERO));
    }

    #[test]
    fn linear_exhaustion_waits_cumulative_delay() {
        // Exhausting retries in linear mode waits delay*(1+2+...+max_attempts)
        // in total across the whole schedule.
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Backoff::Linear,
            delay: Duration::from_millis(10),
        };
        let total: Duration = (0..policy.max_attempts)
            .filter_map(|i| policy.delay_for_attempt(i))
            .sum();
        assert_eq!(total, Duration::from_millis(10 * (1 + 2 + 3)));
    }
}
