//! Anti-replay nonce generation.
//!
//! Nonces are wall-clock milliseconds. The clock never hands out the same
//! value twice: when time has not moved past the last nonce, the last nonce
//! plus one is returned instead.

use deployer_types::Nonce;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NonceError {
	#[error("System clock is before the Unix epoch: {0}")]
	ClockBeforeEpoch(String),
}

/// Source of wall-clock time in milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
	fn now_millis(&self) -> Result<u64, NonceError>;
}

/// Reads [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
	fn now_millis(&self) -> Result<u64, NonceError> {
		let elapsed = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map_err(|e| NonceError::ClockBeforeEpoch(e.to_string()))?;
		Ok(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
	}
}

/// Strictly increasing nonce generator, safe to share between pipelines.
pub struct NonceClock {
	source: Box<dyn TimeSource>,
	last: AtomicU64,
}

impl NonceClock {
	/// Creates a clock over the system time.
	pub fn new() -> Result<Self, NonceError> {
		Self::with_source(Box::new(SystemTimeSource))
	}

	/// Creates a clock over `source`, checking once that it is usable.
	pub fn with_source(source: Box<dyn TimeSource>) -> Result<Self, NonceError> {
		source.now_millis()?;
		Ok(Self {
			source,
			last: AtomicU64::new(0),
		})
	}

	/// Returns the next nonce.
	///
	/// Never fails: if the source errors after construction the clock keeps
	/// counting up from the last value handed out.
	pub fn next(&self) -> Nonce {
		let now = self.source.now_millis().unwrap_or(0);
		let advance = |last: u64| Some(now.max(last.saturating_add(1)));
		let previous = match self
			.last
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, advance)
		{
			Ok(previous) | Err(previous) => previous,
		};
		Nonce(now.max(previous.saturating_add(1)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;
	use std::sync::Arc;

	struct StalledClock(u64);

	impl TimeSource for StalledClock {
		fn now_millis(&self) -> Result<u64, NonceError> {
			Ok(self.0)
		}
	}

	struct BrokenClock;

	impl TimeSource for BrokenClock {
		fn now_millis(&self) -> Result<u64, NonceError> {
			Err(NonceError::ClockBeforeEpoch("negative".into()))
		}
	}

	#[test]
	fn test_stalled_clock_still_increases() {
		let clock = NonceClock::with_source(Box::new(StalledClock(1_700_000_000_000))).unwrap();
		let first = clock.next();
		let second = clock.next();
		let third = clock.next();
		assert_eq!(first, Nonce(1_700_000_000_000));
		assert_eq!(second, Nonce(1_700_000_000_001));
		assert_eq!(third, Nonce(1_700_000_000_002));
	}

	#[test]
	fn test_system_clock_is_close_to_now() {
		let clock = NonceClock::new().unwrap();
		let nonce = clock.next();
		let now = SystemTimeSource.now_millis().unwrap();
		assert!(nonce.as_u64() <= now);
		assert!(now - nonce.as_u64() < 60_000);
	}

	#[test]
	fn test_pre_epoch_clock_is_rejected_up_front() {
		assert!(NonceClock::with_source(Box::new(BrokenClock)).is_err());
	}

	#[test]
	fn test_concurrent_callers_never_share_a_nonce() {
		let clock = Arc::new(NonceClock::with_source(Box::new(StalledClock(42))).unwrap());
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let clock = clock.clone();
				std::thread::spawn(move || (0..500).map(|_| clock.next()).collect::<Vec<_>>())
			})
			.collect();

		let mut seen = HashSet::new();
		for handle in handles {
			for nonce in handle.join().unwrap() {
				assert!(seen.insert(nonce), "duplicate nonce {}", nonce);
			}
		}
		assert_eq!(seen.len(), 4000);
	}
}
