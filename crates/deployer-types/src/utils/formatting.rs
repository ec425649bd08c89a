//! String formatting utilities.
//!
//! Provides functions for hex prefix management, lowercase address rendering
//! and truncation of long identifiers for log output.

use alloy_primitives::Address;

/// Truncates a long identifier for display, keeping the first 8 characters.
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 8 {
		id.to_string()
	} else {
		format!("{}..", &id[..8])
	}
}

/// Adds "0x" prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.to_lowercase().starts_with("0x") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes "0x" or "0X" prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Renders an address as `0x` followed by 40 lowercase hex characters.
///
/// The exchange compares addresses textually, so checksummed casing is never
/// sent on the wire.
pub fn lower_hex_address(address: &Address) -> String {
	format!("0x{}", hex::encode(address.as_slice()))
}
