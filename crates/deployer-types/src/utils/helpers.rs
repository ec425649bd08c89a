//! Helper utilities for timestamp retrieval.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current UNIX timestamp in seconds, 0 if the system time is before the epoch.
pub fn current_timestamp() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// Current UNIX timestamp in milliseconds, `None` if the system time is before the epoch.
pub fn current_timestamp_millis() -> Option<u64> {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.ok()
		.map(|d| d.as_millis() as u64)
}
