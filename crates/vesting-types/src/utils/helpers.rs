//! Helper utilities for common operations.

/// Current UNIX timestamp in seconds, or 0 if the clock is before the epoch.
///
/// Only the CLI uses wall-clock time; ledger and escrow operations take their
/// timestamp from the caller's `CallContext`.
pub fn current_timestamp() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}
