use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Get current timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Exponential backoff calculation
pub fn calculate_backoff_duration(attempt: u32, base_ms: u64, max_ms: u64) -> std::time::Duration {
    let backoff_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    let capped_ms = backoff_ms.min(max_ms);
    std::time::Duration::from_millis(capped_ms)
}

/// Calendar day of a timestamp on the wall clock of `zone`
pub fn local_day(timestamp: DateTime<Utc>, zone: Tz) -> NaiveDate {
    timestamp.with_timezone(&zone).date_naive()
}
