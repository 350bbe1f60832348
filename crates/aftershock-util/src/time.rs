//! Time utilities for aftershock

use chrono::{DateTime, Local};
use std::time::Duration;

/// Current wall-clock time, used for arrival and fault timestamps
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Convert a millisecond setting into a deadline. 0 means unlimited.
pub fn millis_or_unlimited(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
