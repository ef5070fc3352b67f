//! Wall-clock helpers. Stage stamps and completion timestamps are epoch
//! milliseconds; heartbeat expirations are epoch seconds.

use chrono::Utc;

/// Current time as integer epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current time as integer epoch seconds.
pub fn now_sec() -> i64 {
    Utc::now().timestamp()
}
