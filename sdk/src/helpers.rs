//! Helper utilities

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Clamp a score into [0, 1], mapping non-finite values to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
