//! Small helpers shared across the crate.

use chrono::Utc;

/// Current wall-clock time as Unix nanoseconds.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_units_agree() {
        let ms = now_millis();
        let ns = now_nanos();
        assert!((ns / 1_000_000 - ms).abs() < 1_000);
    }
}
