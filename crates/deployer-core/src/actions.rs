//! Construction and validation of exchange actions.
//!
//! The builder fills the network-derived fields of every action
//! (`signatureChainId`, `hyperliquidChain`) and validates user input before
//! anything is signed. Actions come out with a zero nonce; the caller stamps a
//! fresh one right before signing.

use deployer_types::utils::{lower_hex_address, parse_address_strict, parse_hex_payload, parse_wei};
use deployer_types::{
	Action, Chain, ChainFamily, ExistingTokenAllocation, FinalizeEvmContractInput, GenesisAllocation, Network,
	SendToEvmWithData, SignatureChainId, SpotDeployFinalizeEvmContract, SpotDeployGenesis,
	SpotDeployRegisterHyperliquidity, SpotDeployRegisterSpot, SpotDeployRegisterToken,
	SpotDeployRequestEvmContract, SpotDeployUserGenesis, SpotSend,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Largest `weiDecimals` a token may declare.
pub const MAX_WEI_DECIMALS: u8 = 18;

/// Gas limit of an EVM send when the caller does not pick one.
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;

/// Errors raised while validating action parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
	#[error("Invalid address: {0}")]
	InvalidAddress(String),
	#[error("Invalid amount: {0}")]
	InvalidAmount(String),
	#[error("Invalid token: {0}")]
	InvalidToken(String),
	#[error("Invalid payload: {0}")]
	InvalidPayload(String),
	#[error("Invalid token name: {0}")]
	InvalidName(String),
	#[error("Invalid decimals: {0}")]
	InvalidDecimals(String),
	#[error("Invalid parameter: {0}")]
	InvalidParameter(String),
}

/// Parameters of a transfer from the native ledger to an EVM contract.
#[derive(Debug, Clone)]
pub struct SendToEvmParams {
	pub token: String,
	pub amount: String,
	pub destination_chain: Chain,
	/// Body `destinationChainId` when the route uses its own numbering,
	/// such as a bridge domain. Defaults to the EVM chain id of
	/// `destination_chain`.
	pub destination_chain_id: Option<u32>,
	pub destination_recipient: String,
	/// Source perp dex; empty for the spot balance.
	pub source_dex: String,
	pub gas_limit: u64,
	/// `0x` hex calldata handed to the recipient.
	pub data: String,
}

/// Builds validated, unsigned actions for one network.
#[derive(Debug, Clone, Copy)]
pub struct ActionBuilder {
	network: Network,
	signature_chain_id: SignatureChainId,
}

impl ActionBuilder {
	pub fn new(network: Network) -> Self {
		Self {
			network,
			signature_chain_id: SignatureChainId::for_network(network),
		}
	}

	/// Overrides the signing-domain chain id of the network.
	pub fn with_signature_chain_id(mut self, chain_id: u64) -> Self {
		self.signature_chain_id = SignatureChainId(chain_id);
		self
	}

	pub fn network(&self) -> Network {
		self.network
	}

	fn hyperliquid_chain(&self) -> String {
		self.network.hyperliquid_chain().to_string()
	}

	/// Spot transfer of `amount` of `token` to `destination`.
	pub fn spot_send(
		&self,
		destination: &str,
		token: &str,
		amount: &str,
	) -> Result<Action, ActionError> {
		Ok(Action::SpotSend(SpotSend {
			signature_chain_id: self.signature_chain_id,
			hyperliquid_chain: self.hyperliquid_chain(),
			destination: validate_address(destination, Chain::native(self.network))?,
			token: validate_token_id(token)?,
			amount: validate_decimal_amount(amount)?,
			time: 0,
		}))
	}

	/// Transfer to an EVM contract with a call payload.
	pub fn send_to_evm_with_data(&self, params: SendToEvmParams) -> Result<Action, ActionError> {
		if params.destination_chain.network() != self.network {
			return Err(ActionError::InvalidParameter(format!(
				"destination chain {} is not on {}",
				params.destination_chain, self.network
			)));
		}
		let destination_chain_id = match params.destination_chain_id {
			Some(id) => id,
			None => u32::try_from(params.destination_chain.chain_id()).map_err(|_| {
				ActionError::InvalidParameter(format!(
					"chain id of {} does not fit uint32",
					params.destination_chain
				))
			})?,
		};
		if params.gas_limit == 0 {
			return Err(ActionError::InvalidParameter(
				"gas limit must be greater than zero".into(),
			));
		}
		let data = parse_hex_payload(&params.data).map_err(ActionError::InvalidPayload)?;

		Ok(Action::SendToEvmWithData(SendToEvmWithData {
			signature_chain_id: self.signature_chain_id,
			hyperliquid_chain: self.hyperliquid_chain(),
			token: validate_token_id(&params.token)?,
			amount: validate_decimal_amount(&params.amount)?,
			source_dex: params.source_dex,
			destination_recipient: validate_address(
				&params.destination_recipient,
				params.destination_chain,
			)?,
			address_encoding: params
				.destination_chain
				.family()
				.address_encoding()
				.to_string(),
			destination_chain_id,
			gas_limit: params.gas_limit,
			data,
			nonce: 0,
		}))
	}

	/// Deploy step 1.
	pub fn register_token(
		&self,
		name: &str,
		sz_decimals: u8,
		wei_decimals: u8,
		max_gas: u64,
		full_name: Option<&str>,
	) -> Result<Action, ActionError> {
		validate_token_name(name)?;
		validate_decimals(sz_decimals, wei_decimals)?;
		let full_name = match full_name.map(str::trim) {
			Some("") => {
				return Err(ActionError::InvalidName("full name cannot be blank".into()))
			},
			other => other.map(str::to_string),
		};

		Ok(Action::SpotDeployRegisterToken(SpotDeployRegisterToken {
			signature_chain_id: self.signature_chain_id,
			hyperliquid_chain: self.hyperliquid_chain(),
			name: name.to_string(),
			sz_decimals,
			wei_decimals,
			max_gas,
			full_name,
			nonce: 0,
		}))
	}

	/// Deploy step 2. Addresses are normalized to lowercase.
	pub fn user_genesis(
		&self,
		token: u32,
		users: &[GenesisAllocation],
		existing: &[ExistingTokenAllocation],
	) -> Result<Action, ActionError> {
		if users.is_empty() && existing.is_empty() {
			return Err(ActionError::InvalidParameter(
				"user genesis needs at least one allocation".into(),
			));
		}

		let user_and_wei = users
			.iter()
			.map(|a| {
				let address = validate_address(&a.address, Chain::native(self.network))?;
				Ok((address, validate_wei(&a.wei)?))
			})
			.collect::<Result<Vec<_>, ActionError>>()?;
		let existing_token_and_wei = existing
			.iter()
			.map(|a| Ok((a.token, validate_wei(&a.wei)?)))
			.collect::<Result<Vec<_>, ActionError>>()?;

		Ok(Action::SpotDeployUserGenesis(SpotDeployUserGenesis {
			signature_chain_id: self.signature_chain_id,
			hyperliquid_chain: self.hyperliquid_chain(),
			token,
			user_and_wei,
			existing_token_and_wei,
			nonce: 0,
		}))
	}

	/// Deploy step 3.
	pub fn genesis(
		&self,
		token: u32,
		max_supply: &str,
		no_hyperliquidity: bool,
	) -> Result<Action, ActionError> {
		Ok(Action::SpotDeployGenesis(SpotDeployGenesis {
			signature_chain_id: self.signature_chain_id,
			hyperliquid_chain: self.hyperliquid_chain(),
			token,
			max_supply: validate_wei(max_supply)?,
			no_hyperliquidity,
			nonce: 0,
		}))
	}

	/// Deploy step 4.
	pub fn register_spot(&self, base_token: u32, quote_token: u32) -> Result<Action, ActionError> {
		if base_token == quote_token {
			return Err(ActionError::InvalidParameter(format!(
				"base and quote token are both {}",
				base_token
			)));
		}
		Ok(Action::SpotDeployRegisterSpot(SpotDeployRegisterSpot {
			signature_chain_id: self.signature_chain_id,
			hyperliquid_chain: self.hyperliquid_chain(),
			tokens: [base_token, quote_token],
			nonce: 0,
		}))
	}

	/// Deploy step 5.
	pub fn register_hyperliquidity(
		&self,
		spot: u32,
		start_px: &str,
		order_sz: &str,
		n_orders: u32,
		n_seeded_levels: Option<u32>,
	) -> Result<Action, ActionError> {
		if let Some(levels) = n_seeded_levels {
			if levels > n_orders {
				return Err(ActionError::InvalidParameter(format!(
					"n_seeded_levels ({}) exceeds n_orders ({})",
					levels, n_orders
				)));
			}
		}
		Ok(Action::SpotDeployRegisterHyperliquidity(
			SpotDeployRegisterHyperliquidity {
				signature_chain_id: self.signature_chain_id,
				hyperliquid_chain: self.hyperliquid_chain(),
				spot,
				start_px: validate_decimal_amount(start_px)?,
				order_sz: validate_decimal_amount(order_sz)?,
				n_orders,
				n_seeded_levels,
				nonce: 0,
			},
		))
	}

	/// Requests a link between `token` and the EVM contract at `address`.
	pub fn request_evm_contract(
		&self,
		token: u32,
		address: &str,
		evm_extra_wei_decimals: u8,
	) -> Result<Action, ActionError> {
		if evm_extra_wei_decimals > MAX_WEI_DECIMALS {
			return Err(ActionError::InvalidDecimals(format!(
				"evm_extra_wei_decimals must be at most {}, got {}",
				MAX_WEI_DECIMALS, evm_extra_wei_decimals
			)));
		}
		Ok(Action::SpotDeployRequestEvmContract(
			SpotDeployRequestEvmContract {
				signature_chain_id: self.signature_chain_id,
				hyperliquid_chain: self.hyperliquid_chain(),
				token,
				address: validate_address(address, Chain::native(self.network))?,
				evm_extra_wei_decimals,
				nonce: 0,
			},
		))
	}

	/// Confirms a previously requested EVM contract link.
	pub fn finalize_evm_contract(
		&self,
		token: u32,
		input: FinalizeEvmContractInput,
	) -> Result<Action, ActionError> {
		Ok(Action::SpotDeployFinalizeEvmContract(
			SpotDeployFinalizeEvmContract {
				signature_chain_id: self.signature_chain_id,
				hyperliquid_chain: self.hyperliquid_chain(),
				token,
				input,
				nonce: 0,
			},
		))
	}
}

/// Validates an address for `chain` and returns its lowercase form.
pub fn validate_address(address: &str, chain: Chain) -> Result<String, ActionError> {
	match chain.family() {
		// Both families use 20-byte hex addresses.
		ChainFamily::Native | ChainFamily::Evm => parse_address_strict(address)
			.map(|a| lower_hex_address(&a))
			.map_err(ActionError::InvalidAddress),
	}
}

/// Validates a `NAME:0x<32 hex>` token identifier.
pub fn validate_token_id(token: &str) -> Result<String, ActionError> {
	let Some((name, id)) = token.split_once(':') else {
		return Err(ActionError::InvalidToken(format!(
			"'{}' must look like NAME:0x<32 hex>",
			token
		)));
	};
	validate_token_name(name).map_err(|e| ActionError::InvalidToken(e.to_string()))?;
	let hex = id
		.strip_prefix("0x")
		.ok_or_else(|| ActionError::InvalidToken(format!("token id '{}' must start with 0x", id)))?;
	if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
		return Err(ActionError::InvalidToken(format!(
			"token id '{}' must have 32 hex characters",
			id
		)));
	}
	Ok(token.to_string())
}

/// Token names are non-empty ASCII alphanumerics.
pub fn validate_token_name(name: &str) -> Result<(), ActionError> {
	if name.is_empty() {
		return Err(ActionError::InvalidName("name cannot be empty".into()));
	}
	if !name.bytes().all(|b| b.is_ascii_alphanumeric()) {
		return Err(ActionError::InvalidName(format!(
			"'{}' must be ASCII alphanumeric",
			name
		)));
	}
	Ok(())
}

fn validate_decimals(sz_decimals: u8, wei_decimals: u8) -> Result<(), ActionError> {
	if wei_decimals > MAX_WEI_DECIMALS {
		return Err(ActionError::InvalidDecimals(format!(
			"wei_decimals must be at most {}, got {}",
			MAX_WEI_DECIMALS, wei_decimals
		)));
	}
	if sz_decimals > wei_decimals {
		return Err(ActionError::InvalidDecimals(format!(
			"sz_decimals ({}) cannot exceed wei_decimals ({})",
			sz_decimals, wei_decimals
		)));
	}
	Ok(())
}

/// Non-negative decimal such as `"2.0"`. Returned verbatim so the signed
/// string matches what the caller passed.
pub fn validate_decimal_amount(amount: &str) -> Result<String, ActionError> {
	if amount.trim().is_empty() {
		return Err(ActionError::InvalidAmount("amount cannot be empty".into()));
	}
	if amount.trim() != amount {
		return Err(ActionError::InvalidAmount(format!(
			"'{}' has surrounding whitespace",
			amount
		)));
	}
	let value = Decimal::from_str(amount)
		.map_err(|e| ActionError::InvalidAmount(format!("'{}': {}", amount, e)))?;
	if value.is_sign_negative() && !value.is_zero() {
		return Err(ActionError::InvalidAmount(format!("'{}' is negative", amount)));
	}
	Ok(amount.to_string())
}

/// Non-negative integer amount in the token's smallest unit.
pub fn validate_wei(amount: &str) -> Result<String, ActionError> {
	parse_wei(amount)
		.map(|v| v.to_string())
		.map_err(ActionError::InvalidAmount)
}
