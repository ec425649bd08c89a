//! Utility functions for common type conversions and transformations.
//!
//! This module provides helpers for hex formatting, strict address and
//! payload parsing, timestamps, and the low-level EIP-712 hashing primitives
//! used by the typed-data encoder.

pub mod conversion;
pub mod eip712;
pub mod formatting;
pub mod helpers;

pub use conversion::{parse_address_strict, parse_hex_payload, parse_wei};
pub use eip712::{
	compute_domain_hash, compute_final_digest, Eip712AbiEncoder, DOMAIN_TYPE, ZERO_ADDRESS,
};
pub use formatting::{lower_hex_address, truncate_id, with_0x_prefix, without_0x_prefix};
pub use helpers::{current_timestamp, current_timestamp_millis};
