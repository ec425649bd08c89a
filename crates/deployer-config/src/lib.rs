//! Configuration module for the spot deployer.
//!
//! This module provides the structures that describe a deployer instance:
//! which network it targets, where its signing key and storage live, how it
//! reaches the exchange, and the deploy plans it can execute. Configuration is
//! loaded from TOML with `${VAR}` / `${VAR:-default}` environment
//! interpolation and validated once at startup.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

pub use loader::ConfigLoader;

use deployer_types::utils::{parse_address_strict, parse_wei};
use deployer_types::{Chain, Network, SecretKey};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the deployer.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub deployer: DeployerConfig,
	pub account: AccountConfig,
	pub exchange: ExchangeConfig,
	pub storage: StorageConfig,
	#[serde(default)]
	pub retry: RetryConfig,
	#[serde(default)]
	pub rejections: RejectionConfig,
	/// Deploy plans keyed by token symbol.
	#[serde(default)]
	pub deployments: BTreeMap<String, DeploymentPlan>,
}

/// Identity and target network of this deployer instance.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployerConfig {
	pub id: String,
	pub network: Network,
	/// Overrides the signing-domain chain id of the network.
	#[serde(default)]
	pub signature_chain_id: Option<u64>,
}

impl DeployerConfig {
	pub fn signature_chain_id(&self) -> u64 {
		self.signature_chain_id
			.unwrap_or_else(|| self.network.default_signature_chain_id())
	}

	/// The native ledger deploy records are keyed under.
	pub fn chain(&self) -> Chain {
		Chain::native(self.network)
	}
}

/// Configuration for account management.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of account implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Account the signer acts for, when it is an agent of a vault or
	/// sub-account.
	#[serde(default)]
	pub vault_address: Option<String>,
}

/// Configuration for the exchange transport.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
	#[serde(default = "default_exchange_primary")]
	pub primary: String,
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

fn default_exchange_primary() -> String {
	"http".to_string()
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Backoff for retryable exchange calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
	#[serde(default = "default_initial_interval_ms")]
	pub initial_interval_ms: u64,
	#[serde(default = "default_multiplier")]
	pub multiplier: f64,
	#[serde(default = "default_max_interval_ms")]
	pub max_interval_ms: u64,
	#[serde(default = "default_max_elapsed_ms")]
	pub max_elapsed_ms: u64,
}

fn default_initial_interval_ms() -> u64 {
	250
}

fn default_multiplier() -> f64 {
	1.75
}

fn default_max_interval_ms() -> u64 {
	10_000
}

fn default_max_elapsed_ms() -> u64 {
	60_000
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			initial_interval_ms: default_initial_interval_ms(),
			multiplier: default_multiplier(),
			max_interval_ms: default_max_interval_ms(),
			max_elapsed_ms: default_max_elapsed_ms(),
		}
	}
}

/// How exchange rejections are classified.
#[derive(Debug, Clone, Deserialize)]
pub struct RejectionConfig {
	/// Case-insensitive substrings marking a rejection as "already done".
	#[serde(default = "default_already_completed_patterns")]
	pub already_completed_patterns: Vec<String>,
}

fn default_already_completed_patterns() -> Vec<String> {
	vec![
		"already".to_string(),
		"duplicate".to_string(),
		"has been registered".to_string(),
	]
}

impl Default for RejectionConfig {
	fn default() -> Self {
		Self {
			already_completed_patterns: default_already_completed_patterns(),
		}
	}
}

/// Everything needed to run the spot-deploy procedure for one token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentPlan {
	pub sz_decimals: u8,
	pub wei_decimals: u8,
	/// Maximum gas paid in the deploy auction, in native wei.
	pub max_gas: u64,
	#[serde(default)]
	pub full_name: Option<String>,
	#[serde(default)]
	pub user_genesis: Vec<UserGenesisEntry>,
	#[serde(default)]
	pub existing_token_genesis: Vec<ExistingTokenGenesisEntry>,
	pub max_supply: String,
	#[serde(default)]
	pub no_hyperliquidity: bool,
	/// Quote token of the spot pair; 0 is USDC.
	#[serde(default)]
	pub quote_token: u32,
	pub hyperliquidity: HyperliquidityPlan,
	#[serde(default)]
	pub evm_contract: Option<EvmContractPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserGenesisEntry {
	pub address: String,
	pub wei: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExistingTokenGenesisEntry {
	pub token: u32,
	pub wei: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HyperliquidityPlan {
	pub start_px: String,
	pub order_sz: String,
	pub n_orders: u32,
	#[serde(default)]
	pub n_seeded_levels: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvmContractPlan {
	pub address: String,
	pub evm_extra_wei_decimals: u8,
	#[serde(default)]
	pub finalize: Option<EvmFinalizePlan>,
}

/// How the contract link is finalized; omitted means request only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvmFinalizePlan {
	FirstStorageSlot,
	Create { nonce: u64 },
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut replacements = Vec::new();
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};
		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	let mut result = input.to_string();
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}
	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Configured signing key of the primary account implementation, if it
	/// holds one inline.
	pub fn private_key(&self) -> Option<SecretKey> {
		self.account
			.implementations
			.get(&self.account.primary)
			.and_then(|v| v.get("private_key"))
			.and_then(|v| v.as_str())
			.map(SecretKey::from)
	}

	/// Looks up the deploy plan for `symbol`.
	pub fn deployment(&self, symbol: &str) -> Result<&DeploymentPlan, ConfigError> {
		self.deployments.get(symbol).ok_or_else(|| {
			ConfigError::Validation(format!("No deployment configured for '{}'", symbol))
		})
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.deployer.id.trim().is_empty() {
			return Err(ConfigError::Validation("Deployer ID cannot be empty".into()));
		}
		if self.deployer.signature_chain_id == Some(0) {
			return Err(ConfigError::Validation(
				"signature_chain_id cannot be zero".into(),
			));
		}

		if !self.account.implementations.contains_key(&self.account.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary account '{}' has no implementation section",
				self.account.primary
			)));
		}
		if let Some(vault) = &self.account.vault_address {
			parse_address_strict(vault)
				.map_err(|e| ConfigError::Validation(format!("Invalid vault_address: {}", e)))?;
		}

		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self.storage.implementations.contains_key(&self.storage.primary) {
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' has no implementation section",
				self.storage.primary
			)));
		}

		// The exchange section may omit its implementation table when the
		// network default URL is used.
		if self.exchange.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Exchange primary implementation cannot be empty".into(),
			));
		}

		if self.retry.multiplier < 1.0 || !self.retry.multiplier.is_finite() {
			return Err(ConfigError::Validation(
				"retry.multiplier must be at least 1.0".into(),
			));
		}
		if self.retry.initial_interval_ms == 0 || self.retry.max_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"retry intervals must be greater than zero".into(),
			));
		}

		if self
			.rejections
			.already_completed_patterns
			.iter()
			.any(|p| p.trim().is_empty())
		{
			return Err(ConfigError::Validation(
				"already_completed_patterns cannot contain empty patterns".into(),
			));
		}

		for (symbol, plan) in &self.deployments {
			plan.validate(symbol)?;
		}

		Ok(())
	}
}

impl DeploymentPlan {
	/// Checks that the plan is well formed. Cross-step invariants such as the
	/// supply total are enforced by the deploy pipeline.
	pub fn validate(&self, symbol: &str) -> Result<(), ConfigError> {
		let invalid = |msg: String| ConfigError::Validation(format!("deployments.{}: {}", symbol, msg));

		if symbol.is_empty() || !symbol.bytes().all(|b| b.is_ascii_alphanumeric()) {
			return Err(invalid("token symbol must be ASCII alphanumeric".into()));
		}
		if self.wei_decimals > 18 {
			return Err(invalid(format!(
				"wei_decimals must be at most 18, got {}",
				self.wei_decimals
			)));
		}
		if self.sz_decimals > self.wei_decimals {
			return Err(invalid("sz_decimals cannot exceed wei_decimals".into()));
		}
		parse_wei(&self.max_supply).map_err(|e| invalid(format!("max_supply: {}", e)))?;

		for entry in &self.user_genesis {
			parse_address_strict(&entry.address).map_err(|e| invalid(format!("user_genesis: {}", e)))?;
			parse_wei(&entry.wei).map_err(|e| invalid(format!("user_genesis: {}", e)))?;
		}
		for entry in &self.existing_token_genesis {
			parse_wei(&entry.wei).map_err(|e| invalid(format!("existing_token_genesis: {}", e)))?;
		}
		if let Some(evm) = &self.evm_contract {
			parse_address_strict(&evm.address).map_err(|e| invalid(format!("evm_contract: {}", e)))?;
		}
		Ok(())
	}
}

/// Parses TOML, resolves environment variables and validates.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
