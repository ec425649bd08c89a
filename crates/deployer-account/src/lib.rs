//! Account management module for the spot deployer.
//!
//! This module provides the signer: something that holds a signing key and
//! turns an [`EncodedStructure`] into a recoverable [`Signature`]. Signing is
//! deterministic (RFC 6979), never retries and never exposes key material.
//! Recovery and verification helpers live here as well so every component
//! checks signatures the same way.

use alloy_primitives::{Address, PrimitiveSignature, B256, U256};
use async_trait::async_trait;
use deployer_types::{EncodedStructure, ImplementationRegistry, Signature};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

/// Signer failures. None of them are retried.
#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Malformed, zero or out-of-range private key.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Recovery failed: {0}")]
	RecoveryFailed(String),
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// A holder of one signing key.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a 32-byte EIP-712 digest.
	async fn sign_digest(&self, digest: &B256) -> Result<Signature, AccountError>;
}

pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Signer implementations selectable from `[account]`.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Signs encoded typed data with the configured signer.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Signs an encoded typed-data structure.
	pub async fn sign(&self, encoded: &EncodedStructure) -> Result<Signature, AccountError> {
		self.implementation.sign_digest(&encoded.digest).await
	}
}

/// Converts an alloy signature into the wire representation with `v` in
/// `{27, 28}`.
pub(crate) fn to_wire_signature(signature: &PrimitiveSignature) -> Signature {
	Signature {
		r: B256::from(signature.r().to_be_bytes::<32>()),
		s: B256::from(signature.s().to_be_bytes::<32>()),
		v: 27 + u8::from(signature.v()),
	}
}

/// Recovers the address that produced `signature` over `encoded`.
pub fn recover(encoded: &EncodedStructure, signature: &Signature) -> Result<Address, AccountError> {
	let parity = match signature.v {
		27 => false,
		28 => true,
		other => {
			return Err(AccountError::RecoveryFailed(format!(
				"Invalid recovery id: {}",
				other
			)))
		},
	};
	let primitive = PrimitiveSignature::new(
		U256::from_be_bytes(signature.r.0),
		U256::from_be_bytes(signature.s.0),
		parity,
	);
	primitive
		.recover_address_from_prehash(&encoded.digest)
		.map_err(|e| AccountError::RecoveryFailed(e.to_string()))
}

/// Returns true iff `signature` over `encoded` was produced by `expected`.
pub fn verify(encoded: &EncodedStructure, signature: &Signature, expected: Address) -> bool {
	matches!(recover(encoded, signature), Ok(address) if address == expected)
}
