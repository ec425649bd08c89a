//! Signature value type.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Recoverable secp256k1 signature over an EIP-712 digest.
///
/// `r` and `s` serialize as `0x`-prefixed 32-byte hex strings and `v` as an
/// integer in `{27, 28}`, which is the shape the exchange expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
	pub r: B256,
	pub s: B256,
	pub v: u8,
}

impl Signature {
	/// Recovery parity bit (`v - 27`).
	pub fn parity(&self) -> bool {
		self.v == 28
	}

	/// 65-byte `r || s || v` encoding.
	pub fn to_bytes(&self) -> [u8; 65] {
		let mut out = [0u8; 65];
		out[..32].copy_from_slice(self.r.as_slice());
		out[32..64].copy_from_slice(self.s.as_slice());
		out[64] = self.v;
		out
	}
}
