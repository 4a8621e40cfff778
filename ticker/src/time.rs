use chrono::Utc;

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

pub const MS_PER_MINUTE: u64 = 60_000;
