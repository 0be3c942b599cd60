//! Backoff policy for transient platform failures.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Configuration for the retry strategy.
///
/// Delay for attempt `n` (1-based) is `base_delay * 2^(n-1)`, capped at
/// `max_delay`, with up to `jitter` fractional randomization to avoid
/// synchronized retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay for backoff calculations.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Jitter factor (0.0 = none, 1.0 = up to 100% of the delay).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based; attempt 0 means "the
    /// first try", which has no delay).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);
        apply_jitter(raw, self.jitter)
    }
}

/// Randomize a delay by up to `factor` of its length.
///
/// Uses subsecond wall-clock entropy rather than a PRNG crate; the goal is
/// only to spread simultaneous retries apart, not statistical quality.
fn apply_jitter(delay: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || delay.is_zero() {
        return delay;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    // Uniform-ish fraction in [0, 1)
    let unit = f64::from(nanos % 1_000_000) / 1_000_000.0;
    let scale = 1.0 + factor * (unit - 0.5);
    delay.mul_f64(scale.max(0.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_delay_before_first_try() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(0), Duration::ZERO);
    }

    #[test]
    fn test_exponential_growth_and_cap() {
        let config = RetryConfig {
            max_attempts: 6,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
        };
        assert_eq!(config.delay_for(1), Duration::from_secs(2));
        assert_eq!(config.delay_for(2), Duration::from_secs(4));
        assert_eq!(config.delay_for(3), Duration::from_secs(8));
        assert_eq!(config.delay_for(4), Duration::from_secs(16));
        // Capped
        assert_eq!(config.delay_for(5), Duration::from_secs(30));
        assert_eq!(config.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_bounded() {
        let config = RetryConfig {
            jitter: 0.5,
            ..RetryConfig::default()
        };
        for attempt in 1..5 {
            let base = RetryConfig { jitter: 0.0, ..config.clone() }.delay_for(attempt);
            let jittered = config.delay_for(attempt);
            let lower = base.mul_f64(0.7);
            let upper = base.mul_f64(1.3);
            assert!(
                jittered >= lower && jittered <= upper,
                "attempt {attempt}: {jittered:?} outside [{lower:?}, {upper:?}]"
            );
        }
    }
}
