//! Deploy state machine implementation.
//!
//! Records move through `Unregistered -> TokenRegistered -> UserGenesisApplied
//! -> GenesisFinalized -> SpotRegistered -> HyperliquidityRegistered`. The EVM
//! contract link steps hang off `TokenRegistered` and do not move the stage.

use crate::PipelineError;
use deployer_storage::StorageService;
use deployer_types::{
	current_timestamp, Action, DeployKey, DeployLogEntry, DeployLogEvent, DeployRecord,
	DeployStage, DeployStep, EvmContractLink, ExistingTokenAllocation, GenesisAllocation, Nonce,
	StorageKey,
};
use std::sync::Arc;

/// Whether a step should be sent or is already reflected in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
	Issue,
	AlreadyRecorded,
}

/// The deploy step an action performs, if it is one.
pub fn step_of(action: &Action) -> Option<DeployStep> {
	match action {
		Action::SpotDeployRegisterToken(_) => Some(DeployStep::RegisterToken),
		Action::SpotDeployUserGenesis(_) => Some(DeployStep::UserGenesis),
		Action::SpotDeployGenesis(_) => Some(DeployStep::Genesis),
		Action::SpotDeployRegisterSpot(_) => Some(DeployStep::RegisterSpot),
		Action::SpotDeployRegisterHyperliquidity(_) => Some(DeployStep::RegisterHyperliquidity),
		Action::SpotDeployRequestEvmContract(_) => Some(DeployStep::RequestEvmContract),
		Action::SpotDeployFinalizeEvmContract(_) => Some(DeployStep::FinalizeEvmContract),
		Action::SpotSend(_) | Action::SendToEvmWithData(_) => None,
	}
}

/// Manages deploy record transitions and persistence.
pub struct DeployStateMachine {
	storage: Arc<StorageService>,
}

impl DeployStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Checks whether `step` may run with the record at `stage`.
	///
	/// A step before its predecessor is an error. A core step whose stage is
	/// already recorded is reported as such. User genesis stays repeatable
	/// until genesis is finalized.
	pub fn check(stage: DeployStage, step: DeployStep) -> Result<Transition, PipelineError> {
		let required = step.requires();
		if stage < required {
			return Err(PipelineError::StepOutOfOrder { step, stage });
		}

		let transition = match step {
			DeployStep::RequestEvmContract | DeployStep::FinalizeEvmContract => Transition::Issue,
			DeployStep::UserGenesis if stage <= DeployStage::UserGenesisApplied => {
				Transition::Issue
			},
			_ if stage == required => Transition::Issue,
			_ => Transition::AlreadyRecorded,
		};
		Ok(transition)
	}

	/// Applies a step the exchange accepted (or that is known to have landed)
	/// to the record and clears its pending marker.
	///
	/// `identifier` is the token or spot index for the steps that yield one.
	pub fn apply(
		record: &mut DeployRecord,
		action: &Action,
		identifier: Option<u32>,
	) -> Result<DeployStep, PipelineError> {
		let step = step_of(action).ok_or_else(|| {
			PipelineError::InvariantViolation(format!(
				"{} is not a deploy step",
				action.kind()
			))
		})?;
		if record.furthest_state < step.requires() {
			return Err(PipelineError::StepOutOfOrder {
				step,
				stage: record.furthest_state,
			});
		}

		let missing_identifier = || {
			PipelineError::InvariantViolation(format!("{} succeeded without an index", step))
		};

		match action {
			Action::SpotDeployRegisterToken(_) => {
				record.token_index = Some(identifier.ok_or_else(missing_identifier)?);
			},
			Action::SpotDeployUserGenesis(a) => {
				for (address, wei) in &a.user_and_wei {
					let allocation = GenesisAllocation {
						address: address.clone(),
						wei: wei.clone(),
					};
					if !record.has_allocation(&allocation) {
						record.user_allocations.push(allocation);
					}
				}
				for (token, wei) in &a.existing_token_and_wei {
					let allocation = ExistingTokenAllocation {
						token: *token,
						wei: wei.clone(),
					};
					if !record.has_existing_allocation(&allocation) {
						record.existing_token_allocations.push(allocation);
					}
				}
			},
			Action::SpotDeployGenesis(a) => {
				record.max_supply = Some(a.max_supply.clone());
				record.no_hyperliquidity = Some(a.no_hyperliquidity);
			},
			Action::SpotDeployRegisterSpot(_) => {
				record.spot_index = Some(identifier.ok_or_else(missing_identifier)?);
			},
			Action::SpotDeployRegisterHyperliquidity(_) => {},
			Action::SpotDeployRequestEvmContract(a) => {
				record.evm_contract = Some(EvmContractLink {
					address: a.address.clone(),
					evm_extra_wei_decimals: a.evm_extra_wei_decimals,
					finalized: false,
				});
			},
			Action::SpotDeployFinalizeEvmContract(_) => match record.evm_contract.as_mut() {
				Some(link) => link.finalized = true,
				None => {
					return Err(PipelineError::InvariantViolation(
						"EVM contract finalized before it was requested".into(),
					))
				},
			},
			Action::SpotSend(_) | Action::SendToEvmWithData(_) => {},
		}

		if let Some(completed) = step.completes() {
			record.furthest_state = record.furthest_state.max(completed);
		}
		record.pending = None;
		Ok(step)
	}

	/// Loads the record of `key`, if one exists.
	pub async fn load(&self, key: &DeployKey) -> Result<Option<DeployRecord>, PipelineError> {
		Ok(self
			.storage
			.retrieve_optional(StorageKey::Deployments, &key.id())
			.await?)
	}

	/// Loads the record of `key`, creating and persisting a fresh one first
	/// if none exists.
	pub async fn load_or_create(&self, key: &DeployKey) -> Result<DeployRecord, PipelineError> {
		if let Some(record) = self.load(key).await? {
			if record.key() != *key {
				return Err(PipelineError::InvariantViolation(format!(
					"record stored under {} belongs to {}",
					key,
					record.key()
				)));
			}
			return Ok(record);
		}

		let record = DeployRecord::new(key, current_timestamp());
		self.storage
			.store(StorageKey::Deployments, &key.id(), &record)
			.await?;
		tracing::info!(deployment = %key, "Created deploy record");
		Ok(record)
	}

	/// Persists `record`, stamping `last_updated`.
	pub async fn save(&self, record: &mut DeployRecord) -> Result<(), PipelineError> {
		record.last_updated = current_timestamp();
		self.storage
			.update(StorageKey::Deployments, &record.key().id(), &*record)
			.await?;
		Ok(())
	}

	/// Appends one event to the deploy log of `key`.
	pub async fn log(
		&self,
		key: &DeployKey,
		step: DeployStep,
		nonce: Option<Nonce>,
		event: DeployLogEvent,
	) -> Result<(), PipelineError> {
		let entry = DeployLogEntry {
			timestamp: current_timestamp(),
			step,
			nonce,
			event,
		};
		self.storage
			.append(StorageKey::DeployLog, &key.id(), &entry)
			.await?;
		Ok(())
	}

	/// Every logged event of `key`, oldest first.
	pub async fn history(&self, key: &DeployKey) -> Result<Vec<DeployLogEntry>, PipelineError> {
		Ok(self.storage.read_log(StorageKey::DeployLog, &key.id()).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::actions::ActionBuilder;
	use deployer_storage::implementations::memory::MemoryStorage;
	use deployer_types::{Chain, DeployState, FinalizeEvmContractInput, Network};

	const USER: &str = "0x36279bea31b1cc48dd4454a2c7149f331ef3f3c3";

	fn key() -> DeployKey {
		DeployKey::new(Chain::HypercoreTestnet, "TEST0")
	}

	fn builder() -> ActionBuilder {
		ActionBuilder::new(Network::Testnet)
	}

	#[test]
	fn test_only_register_token_is_legal_from_unregistered() {
		let stage = DeployStage::Unregistered;
		assert_eq!(
			DeployStateMachine::check(stage, DeployStep::RegisterToken).unwrap(),
			Transition::Issue
		);
		for step in [
			DeployStep::UserGenesis,
			DeployStep::Genesis,
			DeployStep::RegisterSpot,
			DeployStep::RegisterHyperliquidity,
			DeployStep::RequestEvmContract,
			DeployStep::FinalizeEvmContract,
		] {
			assert!(matches!(
				DeployStateMachine::check(stage, step),
				Err(PipelineError::StepOutOfOrder { .. })
			));
		}
	}

	#[test]
	fn test_recorded_steps_are_not_reissued() {
		let stage = DeployStage::SpotRegistered;
		for step in [
			DeployStep::RegisterToken,
			DeployStep::UserGenesis,
			DeployStep::Genesis,
			DeployStep::RegisterSpot,
		] {
			assert_eq!(
				DeployStateMachine::check(stage, step).unwrap(),
				Transition::AlreadyRecorded
			);
		}
		assert_eq!(
			DeployStateMachine::check(stage, DeployStep::RegisterHyperliquidity).unwrap(),
			Transition::Issue
		);
	}

	#[test]
	fn test_user_genesis_repeatable_until_genesis() {
		assert_eq!(
			DeployStateMachine::check(DeployStage::UserGenesisApplied, DeployStep::UserGenesis)
				.unwrap(),
			Transition::Issue
		);
		assert_eq!(
			DeployStateMachine::check(DeployStage::GenesisFinalized, DeployStep::UserGenesis)
				.unwrap(),
			Transition::AlreadyRecorded
		);
	}

	#[test]
	fn test_apply_walks_the_core_steps() {
		let b = builder();
		let mut record = DeployRecord::new(&key(), 1);

		let register = b.register_token("TEST0", 2, 8, 1, None).unwrap();
		assert!(DeployStateMachine::apply(&mut record, &register, None).is_err());
		DeployStateMachine::apply(&mut record, &register, Some(1562)).unwrap();
		assert_eq!(
			record.state(),
			Some(DeployState::TokenRegistered { token_index: 1562 })
		);

		let users = vec![GenesisAllocation {
			address: USER.to_string(),
			wei: "100000000900000000".to_string(),
		}];
		let user_genesis = b.user_genesis(1562, &users, &[]).unwrap();
		DeployStateMachine::apply(&mut record, &user_genesis, None).unwrap();
		DeployStateMachine::apply(&mut record, &user_genesis, None).unwrap();
		assert_eq!(record.user_allocations, users);

		let genesis = b.genesis(1562, "100000000900000000", true).unwrap();
		DeployStateMachine::apply(&mut record, &genesis, None).unwrap();
		assert_eq!(record.no_hyperliquidity, Some(true));

		let spot = b.register_spot(1562, 0).unwrap();
		DeployStateMachine::apply(&mut record, &spot, Some(1436)).unwrap();

		let hyperliquidity = b
			.register_hyperliquidity(1436, "2.0", "4.0", 0, None)
			.unwrap();
		DeployStateMachine::apply(&mut record, &hyperliquidity, None).unwrap();
		assert!(record.is_complete());
		assert_eq!(
			record.state(),
			Some(DeployState::HyperliquidityRegistered {
				token_index: 1562,
				spot_index: 1436
			})
		);
	}

	#[test]
	fn test_apply_rejects_out_of_order_steps() {
		let mut record = DeployRecord::new(&key(), 1);
		let spot = builder().register_spot(1562, 0).unwrap();
		assert!(matches!(
			DeployStateMachine::apply(&mut record, &spot, Some(1)),
			Err(PipelineError::StepOutOfOrder { .. })
		));
		assert_eq!(record.furthest_state, DeployStage::Unregistered);
	}

	#[test]
	fn test_evm_link_does_not_move_the_stage() {
		let b = builder();
		let mut record = DeployRecord::new(&key(), 1);
		record.furthest_state = DeployStage::TokenRegistered;
		record.token_index = Some(1562);

		let finalize = b
			.finalize_evm_contract(1562, FinalizeEvmContractInput::FirstStorageSlot)
			.unwrap();
		assert!(DeployStateMachine::apply(&mut record, &finalize, None).is_err());

		let request = b
			.request_evm_contract(1562, "0x2e98e98ab34b42b14fec9d431f7b051b232ba133", 10)
			.unwrap();
		DeployStateMachine::apply(&mut record, &request, None).unwrap();
		DeployStateMachine::apply(&mut record, &finalize, None).unwrap();

		assert_eq!(record.furthest_state, DeployStage::TokenRegistered);
		assert!(record.evm_contract.as_ref().unwrap().finalized);
	}

	#[tokio::test]
	async fn test_records_and_logs_persist() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let machine = DeployStateMachine::new(storage);

		assert!(machine.load(&key()).await.unwrap().is_none());
		let mut record = machine.load_or_create(&key()).await.unwrap();
		record.furthest_state = DeployStage::TokenRegistered;
		record.token_index = Some(7);
		machine.save(&mut record).await.unwrap();

		let loaded = machine.load(&key()).await.unwrap().unwrap();
		assert_eq!(loaded.token_index, Some(7));

		machine
			.log(&key(), DeployStep::RegisterToken, Some(Nonce(1)), DeployLogEvent::Dispatched)
			.await
			.unwrap();
		machine
			.log(
				&key(),
				DeployStep::RegisterToken,
				Some(Nonce(1)),
				DeployLogEvent::Accepted { data: None },
			)
			.await
			.unwrap();
		let history = machine.history(&key()).await.unwrap();
		assert_eq!(history.len(), 2);
		assert_eq!(history[0].event, DeployLogEvent::Dispatched);
	}
}
