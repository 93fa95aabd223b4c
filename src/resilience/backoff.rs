//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Delay before the retry that follows failed attempt `attempt`.
///
/// `base_ms * 2^attempt`, capped at `max_ms`.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponential_base = 2u64.saturating_pow(attempt);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    Duration::from_millis(delay_ms.min(max_ms))
}

/// Add up to `ratio * delay` of random extra delay.
pub fn apply_jitter(delay: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 {
        return delay;
    }

    let jitter_range = (delay.as_millis() as f64 * ratio.min(1.0)) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    delay + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        assert_eq!(calculate_backoff(1, 100, 10_000), Duration::from_millis(200));
        assert_eq!(calculate_backoff(2, 100, 10_000), Duration::from_millis(400));
        assert_eq!(calculate_backoff(3, 100, 10_000), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_capped() {
        assert_eq!(calculate_backoff(10, 100, 1000), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(200, 100, 5000), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(400);
        assert_eq!(apply_jitter(base, 0.0), base);

        for _ in 0..50 {
            let jittered = apply_jitter(base, 0.25);
            assert!(jittered >= base);
            assert!(jittered < base + Duration::from_millis(100));
        }
    }
}
