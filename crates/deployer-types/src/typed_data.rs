//! EIP-712 typed-data model and encoder.
//!
//! A [`TypedData`] value is the complete signing input for one action: the
//! signing domain, the primary type name, the ordered field schema and the
//! message values. [`encode`] turns it into the byte-exact digest that the
//! signer consumes.
//!
//! The encoder deliberately supports only flat structs whose fields are
//! `string`, `uintN`, `address` or `bytes`. Field order is taken verbatim from
//! the schema and is never sorted.

use crate::utils::eip712::{compute_domain_hash, compute_final_digest, Eip712AbiEncoder};
use crate::utils::{lower_hex_address, ZERO_ADDRESS};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Name of the signing domain shared by every user-signed action.
pub const USER_SIGNED_DOMAIN_NAME: &str = "HyperliquidSignTransaction";
/// Version of the user-signed domain.
pub const USER_SIGNED_DOMAIN_VERSION: &str = "1";

/// Errors that can occur while encoding typed data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypedDataError {
	/// Schema and message disagree on the set of fields or on a field's type.
	#[error("Schema mismatch: {0}")]
	SchemaMismatch(String),
	/// A declared field type is outside the supported set.
	#[error("Unsupported field type: {0}")]
	UnsupportedFieldType(String),
}

/// Field types accepted by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eip712Type {
	String,
	/// Unsigned integer of the given bit width (8..=256, multiple of 8).
	Uint(u16),
	Address,
	Bytes,
}

impl FromStr for Eip712Type {
	type Err = TypedDataError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"string" => Ok(Eip712Type::String),
			"address" => Ok(Eip712Type::Address),
			"bytes" => Ok(Eip712Type::Bytes),
			other => {
				let bits = other
					.strip_prefix("uint")
					.and_then(|width| width.parse::<u16>().ok())
					.filter(|bits| *bits >= 8 && *bits <= 256 && bits % 8 == 0)
					.ok_or_else(|| TypedDataError::UnsupportedFieldType(other.to_string()))?;
				Ok(Eip712Type::Uint(bits))
			},
		}
	}
}

impl fmt::Display for Eip712Type {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Eip712Type::String => write!(f, "string"),
			Eip712Type::Uint(bits) => write!(f, "uint{}", bits),
			Eip712Type::Address => write!(f, "address"),
			Eip712Type::Bytes => write!(f, "bytes"),
		}
	}
}

/// One entry of an ordered field schema, as it appears in the `types` section
/// of an EIP-712 envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
	pub name: String,
	#[serde(rename = "type")]
	pub field_type: String,
}

impl FieldSpec {
	pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			field_type: field_type.into(),
		}
	}
}

/// A message value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eip712Value {
	String(String),
	Uint(U256),
	Address(Address),
	Bytes(Bytes),
}

impl Eip712Value {
	fn kind(&self) -> &'static str {
		match self {
			Eip712Value::String(_) => "string",
			Eip712Value::Uint(_) => "uint",
			Eip712Value::Address(_) => "address",
			Eip712Value::Bytes(_) => "bytes",
		}
	}

	fn to_json(&self) -> serde_json::Value {
		match self {
			Eip712Value::String(s) => json!(s),
			Eip712Value::Uint(v) => match u64::try_from(*v) {
				Ok(small) => json!(small),
				Err(_) => json!(v.to_string()),
			},
			Eip712Value::Address(a) => json!(lower_hex_address(a)),
			Eip712Value::Bytes(b) => json!(format!("0x{}", hex::encode(b))),
		}
	}
}

impl From<&str> for Eip712Value {
	fn from(v: &str) -> Self {
		Eip712Value::String(v.to_string())
	}
}

impl From<String> for Eip712Value {
	fn from(v: String) -> Self {
		Eip712Value::String(v)
	}
}

impl From<u8> for Eip712Value {
	fn from(v: u8) -> Self {
		Eip712Value::Uint(U256::from(v))
	}
}

impl From<u32> for Eip712Value {
	fn from(v: u32) -> Self {
		Eip712Value::Uint(U256::from(v))
	}
}

impl From<u64> for Eip712Value {
	fn from(v: u64) -> Self {
		Eip712Value::Uint(U256::from(v))
	}
}

impl From<Address> for Eip712Value {
	fn from(v: Address) -> Self {
		Eip712Value::Address(v)
	}
}

impl From<Bytes> for Eip712Value {
	fn from(v: Bytes) -> Self {
		Eip712Value::Bytes(v)
	}
}

/// Message values keyed by field name. Ordering comes from the schema.
pub type TypedMessage = BTreeMap<String, Eip712Value>;

/// EIP-712 signing domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningDomain {
	pub name: String,
	pub version: String,
	pub chain_id: u64,
	pub verifying_contract: Address,
}

impl SigningDomain {
	/// Domain for user-signed actions: not an on-chain call, so the verifying
	/// contract is the zero address.
	pub fn user_signed(signature_chain_id: u64) -> Self {
		Self {
			name: USER_SIGNED_DOMAIN_NAME.to_string(),
			version: USER_SIGNED_DOMAIN_VERSION.to_string(),
			chain_id: signature_chain_id,
			verifying_contract: ZERO_ADDRESS,
		}
	}

	pub fn separator(&self) -> B256 {
		compute_domain_hash(
			&self.name,
			&self.version,
			self.chain_id,
			&self.verifying_contract,
		)
	}
}

/// Output of the encoder: the domain separator, the message struct hash and
/// the final digest to sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedStructure {
	pub domain_separator: B256,
	pub struct_hash: B256,
	pub digest: B256,
}

/// Complete signing input for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedData {
	pub domain: SigningDomain,
	pub primary_type: String,
	pub schema: Vec<FieldSpec>,
	pub message: TypedMessage,
}

impl TypedData {
	pub fn encode(&self) -> Result<EncodedStructure, TypedDataError> {
		encode(&self.domain, &self.primary_type, &self.schema, &self.message)
	}

	/// Renders the JSON signing envelope
	/// `{domain, types: {primary, EIP712Domain}, primaryType, message}`.
	pub fn to_envelope(&self) -> serde_json::Value {
		let message: serde_json::Map<String, serde_json::Value> = self
			.schema
			.iter()
			.filter_map(|field| {
				self.message
					.get(&field.name)
					.map(|value| (field.name.clone(), value.to_json()))
			})
			.collect();

		json!({
			"domain": {
				"name": self.domain.name,
				"version": self.domain.version,
				"chainId": self.domain.chain_id,
				"verifyingContract": lower_hex_address(&self.domain.verifying_contract),
			},
			"types": {
				self.primary_type.clone(): self.schema,
				"EIP712Domain": [
					{"name": "name", "type": "string"},
					{"name": "version", "type": "string"},
					{"name": "chainId", "type": "uint256"},
					{"name": "verifyingContract", "type": "address"},
				],
			},
			"primaryType": self.primary_type,
			"message": message,
		})
	}
}

/// Builds the EIP-712 type string `Primary(type1 name1,type2 name2,...)`.
pub fn type_string(primary_type: &str, schema: &[FieldSpec]) -> Result<String, TypedDataError> {
	let fields = schema
		.iter()
		.map(|field| {
			let ty: Eip712Type = field.field_type.parse()?;
			Ok(format!("{} {}", ty, field.name))
		})
		.collect::<Result<Vec<_>, TypedDataError>>()?;
	Ok(format!("{}({})", primary_type, fields.join(",")))
}

/// Hashes the message struct according to the ordered schema.
pub fn hash_struct(
	primary_type: &str,
	schema: &[FieldSpec],
	message: &TypedMessage,
) -> Result<B256, TypedDataError> {
	let mut seen = HashSet::with_capacity(schema.len());
	for field in schema {
		if !seen.insert(field.name.as_str()) {
			return Err(TypedDataError::SchemaMismatch(format!(
				"field '{}' declared twice",
				field.name
			)));
		}
	}
	if let Some(extra) = message.keys().find(|name| !seen.contains(name.as_str())) {
		return Err(TypedDataError::SchemaMismatch(format!(
			"message field '{}' is not declared in the schema",
			extra
		)));
	}

	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(type_string(primary_type, schema)?.as_bytes()));

	for field in schema {
		let ty: Eip712Type = field.field_type.parse()?;
		let value = message.get(&field.name).ok_or_else(|| {
			TypedDataError::SchemaMismatch(format!(
				"schema field '{}' is missing from the message",
				field.name
			))
		})?;

		match (ty, value) {
			(Eip712Type::String, Eip712Value::String(s)) => enc.push_string(s),
			(Eip712Type::Bytes, Eip712Value::Bytes(b)) => enc.push_bytes(b),
			(Eip712Type::Address, Eip712Value::Address(a)) => enc.push_address(a),
			(Eip712Type::Uint(bits), Eip712Value::Uint(v)) => {
				if v.bit_len() > usize::from(bits) {
					return Err(TypedDataError::SchemaMismatch(format!(
						"value of '{}' does not fit in uint{}",
						field.name, bits
					)));
				}
				enc.push_uint(bits, *v);
			},
			(ty, value) => {
				return Err(TypedDataError::SchemaMismatch(format!(
					"field '{}' declared as {} but the message holds a {} value",
					field.name,
					ty,
					value.kind()
				)));
			},
		}
	}

	Ok(keccak256(enc.finish()))
}

/// Encodes a domain-separated typed structure for signing.
pub fn encode(
	domain: &SigningDomain,
	primary_type: &str,
	schema: &[FieldSpec],
	message: &TypedMessage,
) -> Result<EncodedStructure, TypedDataError> {
	let struct_hash = hash_struct(primary_type, schema, message)?;
	let domain_separator = domain.separator();
	Ok(EncodedStructure {
		domain_separator,
		struct_hash,
		digest: compute_final_digest(&domain_separator, &struct_hash),
	})
}
