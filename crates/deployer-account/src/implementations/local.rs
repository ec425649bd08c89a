//! Local private-key signer.
//!
//! Holds the key in memory as an alloy [`PrivateKeySigner`]. The raw key
//! string is only borrowed while parsing and is zeroized by [`SecretKey`].

use crate::{to_wire_signature, AccountError, AccountFactory, AccountInterface, AccountRegistry};
use alloy_primitives::{Address, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use deployer_types::{ImplementationRegistry, SecretKey, Signature};

/// Account backed by a private key held in process memory.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Parses a hex-encoded secp256k1 private key (with or without `0x`).
	///
	/// Empty, malformed and out-of-range keys (including zero) are rejected.
	pub fn new(private_key: &SecretKey) -> Result<Self, AccountError> {
		if private_key.is_empty() {
			return Err(AccountError::InvalidKey("Private key is empty".to_string()));
		}
		let signer: PrivateKeySigner = private_key.with_exposed(|key| {
			key.trim()
				.parse()
				.map_err(|_| AccountError::InvalidKey("Invalid private key format".to_string()))
		})?;
		Ok(Self { signer })
	}

	pub fn address(&self) -> Address {
		self.signer.address()
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	async fn address(&self) -> Result<Address, AccountError> {
		Ok(self.signer.address())
	}

	async fn sign_digest(&self, digest: &B256) -> Result<Signature, AccountError> {
		let signature = self
			.signer
			.sign_hash_sync(digest)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(to_wire_signature(&signature))
	}
}

/// Factory function to create a local account from configuration.
///
/// Configuration parameters:
/// - `private_key`: hex-encoded private key, usually `"${PRIVATE_KEY}"`
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.map(SecretKey::from)
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".to_string()))?;

	let wallet = LocalWallet::new(&private_key)?;
	tracing::debug!(address = %wallet.address(), "Loaded local account");
	Ok(Box::new(wallet))
}

/// Registry for the local account implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{recover, verify, AccountService};
	use deployer_types::{
		Action, EncodedStructure, Network, SignatureChainId, SpotSend,
	};

	const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

	fn wallet() -> LocalWallet {
		LocalWallet::new(&SecretKey::from(TEST_KEY)).unwrap()
	}

	fn spot_send(network: Network) -> EncodedStructure {
		let action = Action::SpotSend(SpotSend {
			signature_chain_id: SignatureChainId::for_network(network),
			hyperliquid_chain: network.hyperliquid_chain().to_string(),
			destination: "0x36279bea31b1cc48dd4454a2c7149f331ef3f3c3".to_string(),
			token: "USDC:0x6d1e7cde53ba9467b783cb7c530ce054".to_string(),
			amount: "1.0".to_string(),
			time: 1_700_000_000_000,
		});
		action.typed_data().encode().unwrap()
	}

	#[test]
	fn test_address_derivation() {
		assert_eq!(wallet().address(), TEST_ADDRESS.parse::<Address>().unwrap());
	}

	#[test]
	fn test_invalid_keys_are_rejected() {
		for key in [
			"",
			"0x1234",
			"not-a-key",
			"0x0000000000000000000000000000000000000000000000000000000000000000",
		] {
			assert!(
				matches!(
					LocalWallet::new(&SecretKey::from(key)),
					Err(AccountError::InvalidKey(_))
				),
				"key {:?} should be rejected",
				key
			);
		}
	}

	#[tokio::test]
	async fn test_signing_is_deterministic_and_recoverable() {
		let service = AccountService::new(Box::new(wallet()));
		let encoded = spot_send(Network::Testnet);

		let a = service.sign(&encoded).await.unwrap();
		let b = service.sign(&encoded).await.unwrap();
		assert_eq!(a, b);
		assert!(a.v == 27 || a.v == 28);

		let expected: Address = TEST_ADDRESS.parse().unwrap();
		assert_eq!(recover(&encoded, &a).unwrap(), expected);
		assert!(verify(&encoded, &a, expected));
	}

	#[tokio::test]
	async fn test_signature_is_bound_to_its_network_domain() {
		let service = AccountService::new(Box::new(wallet()));
		let expected: Address = TEST_ADDRESS.parse().unwrap();

		let mainnet = spot_send(Network::Mainnet);
		let testnet = spot_send(Network::Testnet);
		let mainnet_sig = service.sign(&mainnet).await.unwrap();
		let testnet_sig = service.sign(&testnet).await.unwrap();

		assert!(verify(&mainnet, &mainnet_sig, expected));
		assert!(verify(&testnet, &testnet_sig, expected));
		assert!(!verify(&testnet, &mainnet_sig, expected));
		assert!(!verify(&mainnet, &testnet_sig, expected));
	}

	#[test]
	fn test_factory_requires_private_key() {
		let config: toml::Value = toml::from_str("other = 1").unwrap();
		assert!(matches!(
			create_account(&config),
			Err(AccountError::InvalidKey(_))
		));

		let config: toml::Value =
			toml::from_str(&format!("private_key = \"{}\"", TEST_KEY)).unwrap();
		assert!(create_account(&config).is_ok());
	}
}
