//! Strict parsing of user-supplied addresses, payloads and integer amounts.
//!
//! These parsers are stricter than the `FromStr` implementations of the
//! primitive types: a missing `0x` prefix or a wrong length is rejected
//! instead of being accepted silently.

use super::formatting::without_0x_prefix;
use alloy_primitives::{Address, Bytes, U256};

/// Parses a `0x`-prefixed, 40 hex character address.
pub fn parse_address_strict(value: &str) -> Result<Address, String> {
	let Some(body) = value.strip_prefix("0x") else {
		return Err(format!("address '{}' must start with 0x", value));
	};
	if body.len() != 40 {
		return Err(format!(
			"address '{}' must have 40 hex characters, got {}",
			value,
			body.len()
		));
	}
	let raw = hex::decode(body).map_err(|e| format!("address '{}' is not hex: {}", value, e))?;
	Ok(Address::from_slice(&raw))
}

/// Parses a `0x`-prefixed hex payload into raw bytes. `"0x"` is the empty payload.
pub fn parse_hex_payload(value: &str) -> Result<Bytes, String> {
	if !value.starts_with("0x") && !value.starts_with("0X") {
		return Err(format!("payload '{}' must start with 0x", value));
	}
	let raw = hex::decode(without_0x_prefix(value))
		.map_err(|e| format!("payload is not valid hex: {}", e))?;
	Ok(Bytes::from(raw))
}

/// Parses a non-negative integer amount expressed in the token's smallest unit.
pub fn parse_wei(value: &str) -> Result<U256, String> {
	if value.is_empty() {
		return Err("amount cannot be empty".to_string());
	}
	if !value.bytes().all(|b| b.is_ascii_digit()) {
		return Err(format!("amount '{}' must be a non-negative integer", value));
	}
	U256::from_str_radix(value, 10).map_err(|e| format!("amount '{}' is out of range: {}", value, e))
}
