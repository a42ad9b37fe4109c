//! # Reconnect delay policy.
//!
//! [`BackoffPolicy`] turns a consecutive-failure count into a delay:
//!
//! ```text
//! base(n)  = min(floor × factor^(n − 1), ceiling)      n ≥ 1
//! delay(n) = min(jitter(base(n)), ceiling)
//! ```
//!
//! The base is derived from the failure count alone, so jitter never feeds back
//! into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use nowplaying_relay::backoff::{BackoffPolicy, JitterPolicy};
//!
//! let policy = BackoffPolicy {
//!     floor: Duration::from_secs(1),
//!     ceiling: Duration::from_secs(300),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(policy.base_delay(1), Duration::from_secs(1));
//! assert_eq!(policy.base_delay(3), Duration::from_secs(4));
//! assert_eq!(policy.base_delay(20), Duration::from_secs(300));
//! ```

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a backoff delay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JitterPolicy {
    /// Use the exact delay.
    None,
    /// Multiply the delay by a random factor in `[1 - spread, 1 + spread]`.
    Proportional { spread: f64 },
}

impl Default for JitterPolicy {
    fn default() -> Self {
        JitterPolicy::Proportional { spread: 0.5 }
    }
}

impl JitterPolicy {
    /// Build from a spread value; `0` disables jitter.
    pub fn from_spread(spread: f64) -> Self {
        if spread <= 0.0 {
            JitterPolicy::None
        } else {
            JitterPolicy::Proportional {
                spread: spread.min(1.0),
            }
        }
    }

    pub fn apply(&self, delay: Duration) -> Duration {
        match *self {
            JitterPolicy::None => delay,
            JitterPolicy::Proportional { spread } => {
                if delay.is_zero() || spread <= 0.0 {
                    return delay;
                }
                let spread = spread.min(1.0);
                let factor = rand::rng().random_range((1.0 - spread)..=(1.0 + spread));
                // Out-of-range results saturate; callers clamp to their ceiling
                Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
            }
        }
    }
}

/// Exponential reconnect backoff with a floor, a ceiling and jitter.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay after the first failure, and the value it resets to after a success.
    pub floor: Duration,
    /// Upper bound for any delay.
    pub ceiling: Duration,
    /// Growth factor per consecutive failure.
    pub factor: f64,
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `floor = 1s`, `ceiling = 300s`, `factor = 2`, jitter in `[0.5, 1.5]`.
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(300),
            factor: 2.0,
            jitter: JitterPolicy::default(),
        }
    }
}

impl BackoffPolicy {
    /// Delay before jitter for the given number of consecutive failures.
    ///
    /// `0` and `1` both yield the floor.
    pub fn base_delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.floor.as_secs_f64() * self.factor.powi(exp);

        if !secs.is_finite() || secs < 0.0 || secs > self.ceiling.as_secs_f64() {
            self.ceiling
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Jittered delay for the given number of consecutive failures, capped at the ceiling.
    pub fn next(&self, failures: u32) -> Duration {
        self.jitter.apply(self.base_delay(failures)).min(self.ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffPolicy {
        BackoffPolicy {
            jitter: JitterPolicy::None,
            ..BackoffPolicy::default()
        }
    }

    #[test]
    fn test_first_failures_use_floor() {
        let policy = no_jitter();
        assert_eq!(policy.base_delay(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay(1), Duration::from_secs(1));
    }

    #[test]
    fn test_three_failures_double() {
        let policy = no_jitter();
        let delays: Vec<_> = (1..=3).map(|n| policy.next(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn test_monotonic_and_capped() {
        let policy = no_jitter();
        let mut prev = Duration::ZERO;
        for n in 1..40 {
            let delay = policy.base_delay(n);
            assert!(delay >= prev, "failure {}: {:?} < {:?}", n, delay, prev);
            assert!(delay <= policy.ceiling);
            prev = delay;
        }
        assert_eq!(policy.base_delay(9), Duration::from_secs(256));
        assert_eq!(policy.base_delay(10), Duration::from_secs(300));
    }

    #[test]
    fn test_huge_failure_count_clamps() {
        let policy = no_jitter();
        assert_eq!(policy.base_delay(u32::MAX), policy.ceiling);
    }

    #[test]
    fn test_proportional_jitter_bounds() {
        let policy = BackoffPolicy::default();
        for _ in 0..200 {
            let delay = policy.next(4);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_secs(12));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_ceiling() {
        let policy = BackoffPolicy::default();
        for _ in 0..200 {
            assert!(policy.next(30) <= policy.ceiling);
        }
    }

    #[test]
    fn test_jitter_on_maximal_delay_saturates() {
        let policy = BackoffPolicy {
            floor: Duration::from_secs(1),
            ceiling: Duration::MAX,
            factor: 2.0,
            jitter: JitterPolicy::Proportional { spread: 1.0 },
        };
        for _ in 0..50 {
            assert!(policy.next(u32::MAX) <= Duration::MAX);
        }
    }

    #[test]
    fn test_from_spread() {
        assert_eq!(JitterPolicy::from_spread(0.0), JitterPolicy::None);
        assert_eq!(
            JitterPolicy::from_spread(0.2),
            JitterPolicy::Proportional { spread: 0.2 }
        );
        assert_eq!(
            JitterPolicy::from_spread(3.0),
            JitterPolicy::Proportional { spread: 1.0 }
        );
    }
}
