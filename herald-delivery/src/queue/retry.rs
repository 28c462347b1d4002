//! Retry delay with exponential backoff

use std::time::Duration;

use rand::Rng;

/// Delay before the next attempt after `attempt` failed
///
/// # Formula
/// `delay = min(base * 2^(attempt - 1), max) * (1 + random(0..=jitter))`
///
/// Jitter only ever lengthens the delay, so attempt `n + 1` is never
/// scheduled sooner than `base * 2^(n - 1)` after attempt `n` failed.
#[must_use]
pub fn calculate_retry_delay(
    attempt: u32,
    base: Duration,
    max: Duration,
    jitter_factor: f64,
) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let delay = base.saturating_mul(1u32 << exponent).min(max);

    if jitter_factor <= 0.0 || delay.is_zero() {
        return delay;
    }

    let extra = rand::rng().random_range(0.0..=jitter_factor);
    delay.saturating_add(delay.mul_f64(extra))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(60);
    const MAX: Duration = Duration::from_secs(86_400);

    #[test]
    fn doubles_per_attempt() {
        assert_eq!(calculate_retry_delay(1, BASE, MAX, 0.0), Duration::from_secs(60));
        assert_eq!(calculate_retry_delay(2, BASE, MAX, 0.0), Duration::from_secs(120));
        assert_eq!(calculate_retry_delay(3, BASE, MAX, 0.0), Duration::from_secs(240));
    }

    #[test]
    fn capped_at_max() {
        assert_eq!(calculate_retry_delay(20, BASE, MAX, 0.0), MAX);
        assert_eq!(calculate_retry_delay(u32::MAX, BASE, MAX, 0.0), MAX);
    }

    #[test]
    fn zeroth_attempt_uses_base() {
        assert_eq!(calculate_retry_delay(0, BASE, MAX, 0.0), BASE);
    }

    #[test]
    fn jitter_never_shortens() {
        for _ in 0..100 {
            let delay = calculate_retry_delay(2, BASE, MAX, 0.2);
            assert!(delay >= Duration::from_secs(120), "{delay:?} below floor");
            assert!(delay <= Duration::from_secs(144), "{delay:?} above ceiling");
        }
    }
}
