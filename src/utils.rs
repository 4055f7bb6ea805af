//! Small helpers shared across the crate.

use std::time::Duration;

/// Compute the next retry delay of a linear backoff with a hard ceiling.
///
/// Returns `(next_backoff, next_retry_count)`, delays in seconds:
///
/// - `factor == 0` disables backoff: the delay is always zero but the retry
///   is still counted.
/// - otherwise `candidate = backoff + retry_count * factor * unit`. Above
///   `max` the delay saturates at `max` and the retry counter stops
///   advancing, so the term driving the growth stays bounded.
pub fn next_backoff(backoff: f64, factor: f64, unit: f64, max: f64, retry_count: u32) -> (f64, u32) {
    if factor == 0.0 {
        return (0.0, retry_count.saturating_add(1));
    }

    let candidate = backoff + f64::from(retry_count) * factor * unit;
    if candidate > max {
        return (max, retry_count);
    }
    (candidate, retry_count.saturating_add(1))
}

/// Convert a (possibly fractional) number of seconds into a `Duration`.
///
/// Negative and non-finite inputs map to zero; values too large for a
/// `Duration` saturate at `Duration::MAX`.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_factor_disables_backoff() {
        assert_eq!(next_backoff(3.0, 0.0, 1.0, 10.0, 0), (0.0, 1));
        assert_eq!(next_backoff(3.0, 0.0, 1.0, 10.0, 7), (0.0, 8));
    }

    #[test]
    fn test_linear_growth() {
        assert_eq!(next_backoff(0.0, 1.0, 1.0, 5.0, 1), (1.0, 2));
        assert_eq!(next_backoff(0.0, 1.0, 1.0, 5.0, 4), (4.0, 5));
        assert_eq!(next_backoff(1.0, 2.0, 0.5, 5.0, 2), (3.0, 3));
    }

    #[test]
    fn test_cap_freezes_retry_count() {
        assert_eq!(next_backoff(0.0, 1.0, 1.0, 5.0, 6), (5.0, 6));
        assert_eq!(next_backoff(4.0, 1.0, 1.0, 5.0, 2), (5.0, 2));
        // exactly at the cap is not above it
        assert_eq!(next_backoff(0.0, 1.0, 1.0, 5.0, 5), (5.0, 6));
    }

    #[test]
    fn test_delays_are_monotonic_and_capped() {
        let max = 7.5;
        let mut retry = 1;
        let mut previous = 0.0;
        for _ in 0..50 {
            let (delay, next) = next_backoff(0.0, 1.5, 0.5, max, retry);
            assert!(delay >= previous);
            assert!(delay <= max);
            previous = delay;
            retry = next;
        }
        assert_eq!(previous, max);
    }

    #[test]
    fn test_secs_to_duration() {
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1500));
        assert_eq!(secs_to_duration(-1.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(secs_to_duration(1e30), Duration::MAX);
    }
}
