//! Chain and network identifiers.
//!
//! A [`Chain`] is either the exchange-native ledger or one of the supported
//! EVM networks. Names and numeric chain ids map one-to-one; anything outside
//! the table is rejected rather than defaulted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while resolving chains and networks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
	/// The chain name is not in the supported table.
	#[error("Unknown chain: {0}")]
	UnknownChain(String),
	/// The numeric chain id is not in the supported table.
	#[error("Unknown chain id: {0}")]
	UnknownChainId(u64),
	/// The network name is neither mainnet nor testnet.
	#[error("Unknown network: {0}")]
	UnknownNetwork(String),
}

/// Deployment environment of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
	Mainnet,
	Testnet,
}

impl Network {
	pub fn is_mainnet(&self) -> bool {
		matches!(self, Network::Mainnet)
	}

	/// Value of the `hyperliquidChain` field carried by every signed action.
	pub fn hyperliquid_chain(&self) -> &'static str {
		match self {
			Network::Mainnet => "Mainnet",
			Network::Testnet => "Testnet",
		}
	}

	/// Chain id placed in the signing domain (`signatureChainId`).
	///
	/// This is a property of the signing domain only and is unrelated to any
	/// destination chain id carried inside an action body.
	pub fn default_signature_chain_id(&self) -> u64 {
		match self {
			Network::Mainnet => 0xa4b1,
			Network::Testnet => 0x66eee,
		}
	}

	/// Base URL of the exchange API for this network.
	pub fn default_api_url(&self) -> &'static str {
		match self {
			Network::Mainnet => "https://api.hyperliquid.xyz",
			Network::Testnet => "https://api.hyperliquid-testnet.xyz",
		}
	}
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Network::Mainnet => write!(f, "mainnet"),
			Network::Testnet => write!(f, "testnet"),
		}
	}
}

impl FromStr for Network {
	type Err = ChainError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"mainnet" => Ok(Network::Mainnet),
			"testnet" => Ok(Network::Testnet),
			_ => Err(ChainError::UnknownNetwork(s.to_string())),
		}
	}
}

/// Address family of a chain, used to validate recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainFamily {
	/// The exchange-native ledger.
	Native,
	/// An EVM-compatible chain.
	Evm,
}

impl ChainFamily {
	/// Encoding name used in the `addressEncoding` field of cross-chain sends.
	pub fn address_encoding(&self) -> &'static str {
		match self {
			ChainFamily::Native | ChainFamily::Evm => "hex",
		}
	}
}

/// A ledger the deployer can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Chain {
	HypercoreMainnet,
	HypercoreTestnet,
	Ethereum,
	Sepolia,
	Arbitrum,
	ArbitrumSepolia,
	Base,
	BaseSepolia,
	HyperEvm,
	HyperEvmTestnet,
}

impl Chain {
	const ALL: [Chain; 10] = [
		Chain::HypercoreMainnet,
		Chain::HypercoreTestnet,
		Chain::Ethereum,
		Chain::Sepolia,
		Chain::Arbitrum,
		Chain::ArbitrumSepolia,
		Chain::Base,
		Chain::BaseSepolia,
		Chain::HyperEvm,
		Chain::HyperEvmTestnet,
	];

	/// Returns an iterator over every supported chain.
	pub fn all() -> impl Iterator<Item = Self> {
		Self::ALL.into_iter()
	}

	/// The exchange-native ledger of the given network.
	pub fn native(network: Network) -> Self {
		match network {
			Network::Mainnet => Chain::HypercoreMainnet,
			Network::Testnet => Chain::HypercoreTestnet,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Chain::HypercoreMainnet => "hypercore",
			Chain::HypercoreTestnet => "hypercore-testnet",
			Chain::Ethereum => "ethereum",
			Chain::Sepolia => "sepolia",
			Chain::Arbitrum => "arbitrum",
			Chain::ArbitrumSepolia => "arbitrum-sepolia",
			Chain::Base => "base",
			Chain::BaseSepolia => "base-sepolia",
			Chain::HyperEvm => "hyperevm",
			Chain::HyperEvmTestnet => "hyperevm-testnet",
		}
	}

	pub fn chain_id(&self) -> u64 {
		match self {
			Chain::HypercoreMainnet => 1337,
			Chain::HypercoreTestnet => 1338,
			Chain::Ethereum => 1,
			Chain::Sepolia => 11_155_111,
			Chain::Arbitrum => 42_161,
			Chain::ArbitrumSepolia => 421_614,
			Chain::Base => 8453,
			Chain::BaseSepolia => 84_532,
			Chain::HyperEvm => 999,
			Chain::HyperEvmTestnet => 998,
		}
	}

	pub fn is_mainnet(&self) -> bool {
		matches!(
			self,
			Chain::HypercoreMainnet
				| Chain::Ethereum
				| Chain::Arbitrum
				| Chain::Base
				| Chain::HyperEvm
		)
	}

	pub fn network(&self) -> Network {
		if self.is_mainnet() {
			Network::Mainnet
		} else {
			Network::Testnet
		}
	}

	pub fn family(&self) -> ChainFamily {
		match self {
			Chain::HypercoreMainnet | Chain::HypercoreTestnet => ChainFamily::Native,
			_ => ChainFamily::Evm,
		}
	}

	/// Resolves a chain from its numeric id.
	pub fn from_chain_id(chain_id: u64) -> Result<Self, ChainError> {
		Self::all()
			.find(|chain| chain.chain_id() == chain_id)
			.ok_or(ChainError::UnknownChainId(chain_id))
	}
}

impl fmt::Display for Chain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Chain {
	type Err = ChainError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let wanted = s.to_ascii_lowercase();
		Self::all()
			.find(|chain| chain.name() == wanted)
			.ok_or_else(|| ChainError::UnknownChain(s.to_string()))
	}
}

impl TryFrom<String> for Chain {
	type Error = ChainError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<Chain> for String {
	fn from(chain: Chain) -> Self {
		chain.name().to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	#[test]
	fn test_names_and_ids_are_one_to_one() {
		let names: HashSet<_> = Chain::all().map(|c| c.name()).collect();
		let ids: HashSet<_> = Chain::all().map(|c| c.chain_id()).collect();
		assert_eq!(names.len(), Chain::ALL.len());
		assert_eq!(ids.len(), Chain::ALL.len());

		for chain in Chain::all() {
			assert_eq!(chain.name().parse::<Chain>().unwrap(), chain);
			assert_eq!(Chain::from_chain_id(chain.chain_id()).unwrap(), chain);
		}
	}

	#[test]
	fn test_unknown_chain_is_an_error() {
		assert_eq!(
			"optimism".parse::<Chain>(),
			Err(ChainError::UnknownChain("optimism".to_string()))
		);
		assert_eq!(Chain::from_chain_id(10), Err(ChainError::UnknownChainId(10)));
		assert!(serde_json::from_str::<Chain>("\"solana\"").is_err());
	}

	#[test]
	fn test_network_tags() {
		assert_eq!(Network::Mainnet.hyperliquid_chain(), "Mainnet");
		assert_eq!(Network::Testnet.hyperliquid_chain(), "Testnet");
		assert_ne!(
			Network::Mainnet.default_signature_chain_id(),
			Network::Testnet.default_signature_chain_id()
		);
		assert!("devnet".parse::<Network>().is_err());
	}

	#[test]
	fn test_native_chain_follows_network() {
		assert_eq!(Chain::native(Network::Testnet), Chain::HypercoreTestnet);
		assert_eq!(Chain::HypercoreTestnet.network(), Network::Testnet);
		assert_eq!(Chain::HypercoreMainnet.family(), ChainFamily::Native);
		assert_eq!(Chain::Arbitrum.family(), ChainFamily::Evm);
	}

	#[test]
	fn test_chain_serde_uses_names() {
		let json = serde_json::to_string(&Chain::ArbitrumSepolia).unwrap();
		assert_eq!(json, "\"arbitrum-sepolia\"");
		let back: Chain = serde_json::from_str(&json).unwrap();
		assert_eq!(back, Chain::ArbitrumSepolia);
	}
}
