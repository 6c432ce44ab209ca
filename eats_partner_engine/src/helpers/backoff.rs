//! Retry backoff schedule for the event dispatch pipeline.

use chrono::Duration;

/// Delay before the first retry.
const BASE_DELAY_SECS: i64 = 30;
/// Delays never grow beyond one hour.
const MAX_DELAY_SECS: i64 = 3600;
/// An event is marked permanently failed once this many attempts have been made.
pub const MAX_RETRY_ATTEMPTS: i64 = 8;

/// Returns the delay to wait after the given (1-based) attempt number: 30s, 60s, 120s, ... capped at 1h.
pub fn retry_delay(attempt: i64) -> Duration {
    let attempt = attempt.clamp(1, 62);
    let secs = BASE_DELAY_SECS.saturating_mul(1i64 << (attempt - 1)).min(MAX_DELAY_SECS);
    Duration::seconds(secs)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn schedule_doubles_from_thirty_seconds() {
        assert_eq!(retry_delay(1), Duration::seconds(30));
        assert_eq!(retry_delay(2), Duration::seconds(60));
        assert_eq!(retry_delay(3), Duration::seconds(120));
        assert_eq!(retry_delay(4), Duration::seconds(240));
    }

    #[test]
    fn schedule_caps_at_one_hour() {
        assert_eq!(retry_delay(7), Duration::seconds(1920));
        assert_eq!(retry_delay(8), Duration::seconds(3600));
        assert_eq!(retry_delay(20), Duration::seconds(3600));
    }

    #[test]
    fn out_of_range_attempts_are_clamped() {
        assert_eq!(retry_delay(0), Duration::seconds(30));
        assert_eq!(retry_delay(-3), Duration::seconds(30));
    }
}
