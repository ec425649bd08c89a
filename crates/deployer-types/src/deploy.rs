//! Durable deployment records and state-machine stages.
//!
//! A [`DeployRecord`] is the single persisted entity of the deployer: one per
//! `(chain, token symbol)` pair. It stores the furthest completed stage, the
//! identifiers returned by the exchange and any in-flight step whose outcome is
//! not yet known.

use crate::action::Action;
use crate::chain::Chain;
use crate::nonce::Nonce;
use crate::utils::parse_wei;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of the spot-deploy procedure, in strict linear order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStage {
	Unregistered,
	TokenRegistered,
	UserGenesisApplied,
	GenesisFinalized,
	SpotRegistered,
	HyperliquidityRegistered,
}

impl DeployStage {
	/// The stage that follows this one, if any.
	pub fn next(&self) -> Option<DeployStage> {
		match self {
			DeployStage::Unregistered => Some(DeployStage::TokenRegistered),
			DeployStage::TokenRegistered => Some(DeployStage::UserGenesisApplied),
			DeployStage::UserGenesisApplied => Some(DeployStage::GenesisFinalized),
			DeployStage::GenesisFinalized => Some(DeployStage::SpotRegistered),
			DeployStage::SpotRegistered => Some(DeployStage::HyperliquidityRegistered),
			DeployStage::HyperliquidityRegistered => None,
		}
	}
}

impl fmt::Display for DeployStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			DeployStage::Unregistered => "unregistered",
			DeployStage::TokenRegistered => "token_registered",
			DeployStage::UserGenesisApplied => "user_genesis_applied",
			DeployStage::GenesisFinalized => "genesis_finalized",
			DeployStage::SpotRegistered => "spot_registered",
			DeployStage::HyperliquidityRegistered => "hyperliquidity_registered",
		};
		f.write_str(name)
	}
}

/// A step of the deploy procedure.
///
/// The five core steps advance [`DeployStage`]; the two EVM-link steps hang off
/// `TokenRegistered` and are tracked in [`EvmContractLink`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStep {
	RegisterToken,
	UserGenesis,
	Genesis,
	RegisterSpot,
	RegisterHyperliquidity,
	RequestEvmContract,
	FinalizeEvmContract,
}

impl DeployStep {
	/// Stage the record must be at before this step may be issued.
	pub fn requires(&self) -> DeployStage {
		match self {
			DeployStep::RegisterToken => DeployStage::Unregistered,
			DeployStep::UserGenesis => DeployStage::TokenRegistered,
			DeployStep::Genesis => DeployStage::UserGenesisApplied,
			DeployStep::RegisterSpot => DeployStage::GenesisFinalized,
			DeployStep::RegisterHyperliquidity => DeployStage::SpotRegistered,
			DeployStep::RequestEvmContract | DeployStep::FinalizeEvmContract => {
				DeployStage::TokenRegistered
			},
		}
	}

	/// Stage recorded once this step succeeds, for the steps that advance it.
	pub fn completes(&self) -> Option<DeployStage> {
		match self {
			DeployStep::RegisterToken => Some(DeployStage::TokenRegistered),
			DeployStep::UserGenesis => Some(DeployStage::UserGenesisApplied),
			DeployStep::Genesis => Some(DeployStage::GenesisFinalized),
			DeployStep::RegisterSpot => Some(DeployStage::SpotRegistered),
			DeployStep::RegisterHyperliquidity => Some(DeployStage::HyperliquidityRegistered),
			DeployStep::RequestEvmContract | DeployStep::FinalizeEvmContract => None,
		}
	}

	/// Whether a successful response carries an identifier the record keeps.
	pub fn yields_identifier(&self) -> bool {
		matches!(self, DeployStep::RegisterToken | DeployStep::RegisterSpot)
	}
}

impl fmt::Display for DeployStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			DeployStep::RegisterToken => "register_token",
			DeployStep::UserGenesis => "user_genesis",
			DeployStep::Genesis => "genesis",
			DeployStep::RegisterSpot => "register_spot",
			DeployStep::RegisterHyperliquidity => "register_hyperliquidity",
			DeployStep::RequestEvmContract => "request_evm_contract",
			DeployStep::FinalizeEvmContract => "finalize_evm_contract",
		};
		f.write_str(name)
	}
}

/// Read-only view of a record's progress with the identifiers each stage
/// guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
	Unregistered,
	TokenRegistered { token_index: u32 },
	UserGenesisApplied { token_index: u32 },
	GenesisFinalized { token_index: u32 },
	SpotRegistered { token_index: u32, spot_index: u32 },
	HyperliquidityRegistered { token_index: u32, spot_index: u32 },
}

impl DeployState {
	pub fn stage(&self) -> DeployStage {
		match self {
			DeployState::Unregistered => DeployStage::Unregistered,
			DeployState::TokenRegistered { .. } => DeployStage::TokenRegistered,
			DeployState::UserGenesisApplied { .. } => DeployStage::UserGenesisApplied,
			DeployState::GenesisFinalized { .. } => DeployStage::GenesisFinalized,
			DeployState::SpotRegistered { .. } => DeployStage::SpotRegistered,
			DeployState::HyperliquidityRegistered { .. } => DeployStage::HyperliquidityRegistered,
		}
	}
}

impl fmt::Display for DeployState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeployState::Unregistered => write!(f, "Unregistered"),
			DeployState::TokenRegistered { token_index } => {
				write!(f, "TokenRegistered(token_index={})", token_index)
			},
			DeployState::UserGenesisApplied { token_index } => {
				write!(f, "UserGenesisApplied(token_index={})", token_index)
			},
			DeployState::GenesisFinalized { token_index } => {
				write!(f, "GenesisFinalized(token_index={})", token_index)
			},
			DeployState::SpotRegistered {
				token_index,
				spot_index,
			} => write!(
				f,
				"SpotRegistered(token_index={}, spot_index={})",
				token_index, spot_index
			),
			DeployState::HyperliquidityRegistered {
				token_index,
				spot_index,
			} => write!(
				f,
				"HyperliquidityRegistered(token_index={}, spot_index={})",
				token_index, spot_index
			),
		}
	}
}

/// Identity of a deploy pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeployKey {
	pub chain: Chain,
	pub token_symbol: String,
}

impl DeployKey {
	pub fn new(chain: Chain, token_symbol: impl Into<String>) -> Self {
		Self {
			chain,
			token_symbol: token_symbol.into(),
		}
	}

	/// Storage id, e.g. `hypercore-testnet_TEST0`.
	pub fn id(&self) -> String {
		format!("{}_{}", self.chain.name(), self.token_symbol)
	}
}

impl fmt::Display for DeployKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.chain, self.token_symbol)
	}
}

/// A genesis balance assigned to a user address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
	/// Lowercase `0x` address.
	pub address: String,
	/// Amount in wei, decimal digits.
	pub wei: String,
}

/// A genesis balance assigned pro rata to holders of an existing token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingTokenAllocation {
	pub token: u32,
	pub wei: String,
}

/// A step that was signed and handed to the dispatcher but whose outcome has
/// not been recorded yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStep {
	pub step: DeployStep,
	pub nonce: Nonce,
	/// The exact action that was signed, kept so it can be reconciled or
	/// re-applied without rebuilding.
	pub action: Action,
	pub started_at: u64,
}

/// Progress of linking the token to an EVM contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmContractLink {
	pub address: String,
	pub evm_extra_wei_decimals: u8,
	pub finalized: bool,
}

/// Persisted record of one `(chain, token)` deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRecord {
	pub chain: Chain,
	pub token_symbol: String,
	pub furthest_state: DeployStage,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_index: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub spot_index: Option<u32>,
	#[serde(default)]
	pub user_allocations: Vec<GenesisAllocation>,
	#[serde(default)]
	pub existing_token_allocations: Vec<ExistingTokenAllocation>,
	/// False once allocations are known to have been applied outside this
	/// record, in which case the supply check is left to the exchange.
	#[serde(default = "default_true")]
	pub allocations_tracked: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_supply: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub no_hyperliquidity: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub evm_contract: Option<EvmContractLink>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pending: Option<PendingStep>,
	pub created_at: u64,
	pub last_updated: u64,
}

fn default_true() -> bool {
	true
}

impl DeployRecord {
	/// Fresh record for a key that has never been registered.
	pub fn new(key: &DeployKey, now: u64) -> Self {
		Self {
			chain: key.chain,
			token_symbol: key.token_symbol.clone(),
			furthest_state: DeployStage::Unregistered,
			token_index: None,
			spot_index: None,
			user_allocations: Vec::new(),
			existing_token_allocations: Vec::new(),
			allocations_tracked: true,
			max_supply: None,
			no_hyperliquidity: None,
			evm_contract: None,
			pending: None,
			created_at: now,
			last_updated: now,
		}
	}

	pub fn key(&self) -> DeployKey {
		DeployKey::new(self.chain, self.token_symbol.clone())
	}

	/// The typed view of this record's progress.
	///
	/// Returns `None` when the stage claims an identifier the record does not
	/// hold, which means the record is corrupt.
	pub fn state(&self) -> Option<DeployState> {
		let state = match self.furthest_state {
			DeployStage::Unregistered => DeployState::Unregistered,
			DeployStage::TokenRegistered => DeployState::TokenRegistered {
				token_index: self.token_index?,
			},
			DeployStage::UserGenesisApplied => DeployState::UserGenesisApplied {
				token_index: self.token_index?,
			},
			DeployStage::GenesisFinalized => DeployState::GenesisFinalized {
				token_index: self.token_index?,
			},
			DeployStage::SpotRegistered => DeployState::SpotRegistered {
				token_index: self.token_index?,
				spot_index: self.spot_index?,
			},
			DeployStage::HyperliquidityRegistered => DeployState::HyperliquidityRegistered {
				token_index: self.token_index?,
				spot_index: self.spot_index?,
			},
		};
		Some(state)
	}

	pub fn is_complete(&self) -> bool {
		self.furthest_state == DeployStage::HyperliquidityRegistered
	}

	pub fn has_allocation(&self, allocation: &GenesisAllocation) -> bool {
		self.user_allocations.contains(allocation)
	}

	pub fn has_existing_allocation(&self, allocation: &ExistingTokenAllocation) -> bool {
		self.existing_token_allocations.contains(allocation)
	}

	/// Sum of every locally recorded genesis allocation, in wei.
	pub fn tracked_supply(&self) -> Result<U256, String> {
		let amounts = self
			.user_allocations
			.iter()
			.map(|a| a.wei.as_str())
			.chain(self.existing_token_allocations.iter().map(|a| a.wei.as_str()));

		let mut total = U256::ZERO;
		for amount in amounts {
			total = total
				.checked_add(parse_wei(amount)?)
				.ok_or_else(|| "Tracked supply overflows uint256".to_string())?;
		}
		Ok(total)
	}
}

/// What happened during one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeployLogEvent {
	/// The signed action is about to be sent.
	Dispatched,
	Accepted {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		data: Option<serde_json::Value>,
	},
	/// Rejected with a reason that means the step had already been applied.
	AlreadyCompleted { reason: String },
	Rejected { reason: String },
	/// The request provably never reached the exchange.
	Undelivered { reason: String },
	/// The request may or may not have reached the exchange.
	Uncertain { reason: String },
	/// Remote state settled a pending step.
	Reconciled { landed: bool },
	/// An operator settled a pending step.
	OperatorConfirmed { landed: bool },
	/// The step was satisfied locally and nothing was sent.
	Skipped { reason: String },
}

/// One line of the append-only per-key deploy log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployLogEntry {
	pub timestamp: u64,
	pub step: DeployStep,
	pub nonce: Option<Nonce>,
	#[serde(flatten)]
	pub event: DeployLogEvent,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key() -> DeployKey {
		DeployKey::new(Chain::HypercoreTestnet, "TEST0")
	}

	#[test]
	fn test_stages_are_linear() {
		let mut stage = DeployStage::Unregistered;
		let mut seen = vec![stage];
		while let Some(next) = stage.next() {
			assert!(next > stage);
			stage = next;
			seen.push(stage);
		}
		assert_eq!(seen.len(), 6);
		assert_eq!(stage, DeployStage::HyperliquidityRegistered);
	}

	#[test]
	fn test_core_steps_complete_the_stage_after_their_requirement() {
		for step in [
			DeployStep::RegisterToken,
			DeployStep::UserGenesis,
			DeployStep::Genesis,
			DeployStep::RegisterSpot,
			DeployStep::RegisterHyperliquidity,
		] {
			assert_eq!(step.requires().next(), step.completes());
		}
		assert_eq!(DeployStep::RequestEvmContract.completes(), None);
	}

	#[test]
	fn test_record_state_requires_identifiers() {
		let mut record = DeployRecord::new(&key(), 1);
		assert_eq!(record.state(), Some(DeployState::Unregistered));

		record.furthest_state = DeployStage::TokenRegistered;
		assert_eq!(record.state(), None);

		record.token_index = Some(1562);
		assert_eq!(
			record.state(),
			Some(DeployState::TokenRegistered { token_index: 1562 })
		);
		assert_eq!(
			record.state().unwrap().to_string(),
			"TokenRegistered(token_index=1562)"
		);
	}

	#[test]
	fn test_tracked_supply_sums_both_allocation_kinds() {
		let mut record = DeployRecord::new(&key(), 1);
		record.user_allocations.push(GenesisAllocation {
			address: "0x36279bea31b1cc48dd4454a2c7149f331ef3f3c3".to_string(),
			wei: "100000000000000000".to_string(),
		});
		record.existing_token_allocations.push(ExistingTokenAllocation {
			token: 0,
			wei: "900000000".to_string(),
		});
		assert_eq!(
			record.tracked_supply().unwrap(),
			U256::from(100_000_000_900_000_000u64)
		);

		record.user_allocations[0].wei = "1e18".to_string();
		assert!(record.tracked_supply().is_err());
	}

	#[test]
	fn test_persisted_record_shape() {
		let mut record = DeployRecord::new(&key(), 10);
		record.furthest_state = DeployStage::TokenRegistered;
		record.token_index = Some(1562);
		let json = serde_json::to_value(&record).unwrap();
		assert_eq!(json["chain"], "hypercore-testnet");
		assert_eq!(json["token_symbol"], "TEST0");
		assert_eq!(json["furthest_state"], "token_registered");
		assert_eq!(json["token_index"], 1562);
		assert!(json.get("spot_index").is_none());
		assert_eq!(json["last_updated"], 10);

		let back: DeployRecord = serde_json::from_value(json).unwrap();
		assert_eq!(back, record);
	}

	#[test]
	fn test_log_entry_is_flat() {
		let entry = DeployLogEntry {
			timestamp: 5,
			step: DeployStep::Genesis,
			nonce: Some(Nonce(7)),
			event: DeployLogEvent::Rejected {
				reason: "bad supply".to_string(),
			},
		};
		let json = serde_json::to_value(&entry).unwrap();
		assert_eq!(json["event"], "rejected");
		assert_eq!(json["reason"], "bad supply");
		assert_eq!(json["step"], "genesis");
		assert_eq!(json["nonce"], 7);
	}

	#[test]
	fn test_key_id() {
		assert_eq!(key().id(), "hypercore-testnet_TEST0");
		assert_eq!(key().to_string(), "hypercore-testnet/TEST0");
	}
}
