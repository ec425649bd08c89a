//! Anti-replay nonces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Request identifier stamped on every signed action.
///
/// Derived from wall-clock milliseconds and strictly increasing per signing
/// key. For deploy steps the nonce also correlates a contract-creation step
/// with its finalize step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(pub u64);

impl Nonce {
	pub fn as_u64(&self) -> u64 {
		self.0
	}
}

impl From<u64> for Nonce {
	fn from(value: u64) -> Self {
		Nonce(value)
	}
}

impl fmt::Display for Nonce {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}
