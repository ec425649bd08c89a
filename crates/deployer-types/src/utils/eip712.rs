//! Low-level EIP-712 hashing primitives.
//!
//! These helpers provide:
//! - Domain separator computation for the fixed four-field domain schema
//! - Final digest computation (0x1901 || domainHash || structHash)
//! - A minimal word encoder for the static field types the deployer signs

use alloy_primitives::{keccak256, Address, B256, U256};

/// Canonical domain schema. Field order is part of the hash.
pub const DOMAIN_TYPE: &str =
	"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Verifying contract of off-chain authorized actions.
pub const ZERO_ADDRESS: Address = Address::ZERO;

/// Compute the EIP-712 domain separator
/// (keccak256(abi.encode(typeHash, nameHash, versionHash, chainId, verifyingContract))).
pub fn compute_domain_hash(
	name: &str,
	version: &str,
	chain_id: u64,
	verifying_contract: &Address,
) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(DOMAIN_TYPE.as_bytes()));
	enc.push_string(name);
	enc.push_string(version);
	enc.push_uint(256, U256::from(chain_id));
	enc.push_address(verifying_contract);
	keccak256(enc.finish())
}

/// Compute the final EIP-712 digest: keccak256(0x1901 || domainHash || structHash).
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> B256 {
	let mut out = Vec::with_capacity(2 + 32 + 32);
	out.push(0x19);
	out.push(0x01);
	out.extend_from_slice(domain_hash.as_slice());
	out.extend_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// Minimal ABI word encoder for EIP-712 struct hashing.
///
/// Every pushed value occupies exactly one 32-byte word. Dynamic values
/// (`string`, `bytes`) are pushed as the keccak256 of their raw contents.
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Default for Eip712AbiEncoder {
	fn default() -> Self {
		Self::new()
	}
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self { buf: Vec::new() }
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	pub fn push_address(&mut self, addr: &Address) {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(addr.as_slice());
		self.buf.extend_from_slice(&word);
	}

	/// Pushes an unsigned integer serialized at its declared bit width.
	///
	/// The value is written as `bits / 8` big-endian bytes and left-padded to a
	/// full word. Callers must have checked that the value fits the width.
	pub fn push_uint(&mut self, bits: u16, v: U256) {
		let width = usize::from(bits / 8);
		let full: [u8; 32] = v.to_be_bytes::<32>();
		let mut word = [0u8; 32];
		word[32 - width..].copy_from_slice(&full[32 - width..]);
		self.buf.extend_from_slice(&word);
	}

	pub fn push_string(&mut self, v: &str) {
		self.push_b256(&keccak256(v.as_bytes()));
	}

	pub fn push_bytes(&mut self, v: &[u8]) {
		self.push_b256(&keccak256(v));
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_push_uint_uses_declared_width() {
		let mut enc = Eip712AbiEncoder::new();
		enc.push_uint(32, U256::from(0x0102_0304u32));
		let word = enc.finish();
		assert_eq!(word.len(), 32);
		assert!(word[..28].iter().all(|b| *b == 0));
		assert_eq!(&word[28..], &[1, 2, 3, 4]);
	}

	#[test]
	fn test_domain_hash_depends_on_chain_id() {
		let a = compute_domain_hash("HyperliquidSignTransaction", "1", 0x66eee, &ZERO_ADDRESS);
		let b = compute_domain_hash("HyperliquidSignTransaction", "1", 0xa4b1, &ZERO_ADDRESS);
		assert_ne!(a, b);
	}

	#[test]
	fn test_final_digest_prefix() {
		let digest = compute_final_digest(&B256::ZERO, &B256::ZERO);
		let mut expected = vec![0x19, 0x01];
		expected.extend_from_slice(&[0u8; 64]);
		assert_eq!(digest, keccak256(expected));
	}
}
