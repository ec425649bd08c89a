//! The spot-deploy pipeline.
//!
//! A [`DeployPipeline`] owns one `(chain, token)` deployment for its whole
//! lifetime: it holds the exclusive lease on the key, resolves any step left
//! pending by an earlier run, then issues the remaining steps in order. Every
//! step follows the same path: build, stamp, sign, persist a pending marker,
//! dispatch, interpret, persist.

use crate::actions::ActionBuilder;
use crate::classifier::{Rejection, RejectionClassifier};
use crate::recovery::{ReconcileResult, Reconciler};
use crate::state::{DeployStateMachine, Transition};
use crate::submit::ActionSubmitter;
use crate::{PipelineError, PipelineFailure};
use deployer_config::{DeploymentPlan, EvmFinalizePlan};
use deployer_delivery::DeliveryError;
use deployer_storage::{Lease, StorageService};
use deployer_types::utils::parse_wei;
use deployer_types::{
	current_timestamp, Action, DeployKey, DeployLogEvent, DeployRecord, DeployStage, DeployState,
	DeployStep,
	DispatchOutcome, ExistingTokenAllocation, FinalizeEvmContractInput, GenesisAllocation, Nonce,
	PendingStep, StorageKey,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::instrument;

/// Result of one step that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
	/// Sent and accepted.
	Applied(DeployState),
	/// Rejected as already done; recorded as success.
	AlreadyCompleted(DeployState),
	/// The record already held this step; nothing was sent.
	AlreadyRecorded(DeployState),
	/// Nothing left to send for this step.
	Skipped(DeployState),
}

impl StepOutcome {
	pub fn state(&self) -> DeployState {
		match self {
			StepOutcome::Applied(state)
			| StepOutcome::AlreadyCompleted(state)
			| StepOutcome::AlreadyRecorded(state)
			| StepOutcome::Skipped(state) => *state,
		}
	}
}

/// An operator's ruling on a pending step that reconciliation could not
/// settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorVerdict {
	pub landed: bool,
	/// Token or spot index, for steps that yield one.
	pub identifier: Option<u32>,
}

/// Everything a pipeline shares with the rest of the process.
pub struct PipelineContext {
	pub actions: ActionBuilder,
	pub submitter: Arc<ActionSubmitter>,
	pub storage: Arc<StorageService>,
	pub classifier: RejectionClassifier,
}

pub struct DeployPipeline {
	key: DeployKey,
	plan: DeploymentPlan,
	actions: ActionBuilder,
	submitter: Arc<ActionSubmitter>,
	state: DeployStateMachine,
	reconciler: Reconciler,
	classifier: RejectionClassifier,
	cancel: watch::Receiver<bool>,
	record: DeployRecord,
	_lease: Lease,
}

impl DeployPipeline {
	/// Takes the lease on `key` and loads (or creates) its record.
	///
	/// Fails with [`PipelineError::LeaseHeld`] while another pipeline owns
	/// the key.
	pub async fn open(
		key: DeployKey,
		plan: DeploymentPlan,
		context: PipelineContext,
		cancel: watch::Receiver<bool>,
	) -> Result<Self, PipelineError> {
		let lease = context
			.storage
			.acquire_lease(StorageKey::Leases, &key.id())
			.await?;
		let user = context.submitter.address().await?;
		let state = DeployStateMachine::new(context.storage);
		let record = state.load_or_create(&key).await?;
		let reconciler = Reconciler::new(context.submitter.delivery().clone(), user);

		Ok(Self {
			key,
			plan,
			actions: context.actions,
			submitter: context.submitter,
			state,
			reconciler,
			classifier: context.classifier,
			cancel,
			record,
			_lease: lease,
		})
	}

	pub fn key(&self) -> &DeployKey {
		&self.key
	}

	pub fn record(&self) -> &DeployRecord {
		&self.record
	}

	/// Typed view of the current record.
	pub fn current_state(&self) -> Result<DeployState, PipelineError> {
		self.record.state().ok_or_else(|| {
			PipelineError::InvariantViolation(format!(
				"record of {} is at {} but lacks its index",
				self.key, self.record.furthest_state
			))
		})
	}

	/// Runs every remaining step of the plan.
	#[instrument(skip_all, fields(deployment = %self.key))]
	pub async fn run(&mut self) -> Result<DeployState, PipelineFailure> {
		let result = self.run_steps().await;
		result.map_err(|error| {
			tracing::error!(
				error = %error,
				furthest_state = %self.record.furthest_state,
				"Deploy pipeline stopped"
			);
			PipelineFailure {
				furthest_state: self.record.furthest_state,
				error,
			}
		})
	}

	async fn run_steps(&mut self) -> Result<DeployState, PipelineError> {
		self.resolve_pending().await?;

		self.register_token().await?;
		self.user_genesis_from_plan().await?;
		self.genesis().await?;
		self.register_spot().await?;
		self.register_hyperliquidity().await?;
		self.link_evm_contract_from_plan().await?;

		let state = self.current_state()?;
		tracing::info!(state = %state, "Deployment complete");
		Ok(state)
	}

	/// Settles a step left pending by an earlier run by consulting the
	/// exchange. Does nothing when no step is pending.
	#[instrument(skip_all, fields(deployment = %self.key))]
	pub async fn resolve_pending(&mut self) -> Result<(), PipelineError> {
		let Some(pending) = self.record.pending.clone() else {
			return Ok(());
		};
		tracing::warn!(step = %pending.step, nonce = %pending.nonce, "Found pending step");

		match self.reconciler.reconcile(&self.record, &pending).await? {
			ReconcileResult::Landed { identifier } => {
				DeployStateMachine::apply(&mut self.record, &pending.action, identifier)?;
				self.state.save(&mut self.record).await?;
				self.log(pending.step, Some(pending.nonce), DeployLogEvent::Reconciled { landed: true })
					.await?;
			},
			ReconcileResult::NotLanded => {
				self.record.pending = None;
				self.state.save(&mut self.record).await?;
				self.log(
					pending.step,
					Some(pending.nonce),
					DeployLogEvent::Reconciled { landed: false },
				)
				.await?;
			},
			ReconcileResult::Unknown => {
				return Err(PipelineError::UncertainOutcome {
					step: pending.step.to_string(),
					nonce: pending.nonce,
					reason: "remote state cannot tell whether it landed; confirm it with \
					         `confirm --landed` or `confirm --not-landed`"
						.into(),
				});
			},
		}
		Ok(())
	}

	/// Settles the pending step on an operator's word.
	#[instrument(skip_all, fields(deployment = %self.key, landed = verdict.landed))]
	pub async fn confirm(&mut self, verdict: OperatorVerdict) -> Result<DeployState, PipelineError> {
		let Some(pending) = self.record.pending.clone() else {
			return Err(PipelineError::InvariantViolation(format!(
				"{} has no pending step to confirm",
				self.key
			)));
		};

		if verdict.landed {
			let identifier = match verdict.identifier {
				Some(identifier) => Some(identifier),
				None if pending.step.yields_identifier() => {
					self.lookup_identifier(pending.step).await?
				},
				None => None,
			};
			if pending.step.yields_identifier() && identifier.is_none() {
				return Err(PipelineError::Validation(format!(
					"{} yields an index; pass it with --index",
					pending.step
				)));
			}
			DeployStateMachine::apply(&mut self.record, &pending.action, identifier)?;
		} else {
			self.record.pending = None;
		}

		self.state.save(&mut self.record).await?;
		self.log(
			pending.step,
			Some(pending.nonce),
			DeployLogEvent::OperatorConfirmed {
				landed: verdict.landed,
			},
		)
		.await?;
		self.current_state()
	}

	/// Step 1: register the token and record its index.
	pub async fn register_token(&mut self) -> Result<StepOutcome, PipelineError> {
		let step = DeployStep::RegisterToken;
		if let Some(outcome) = self.precheck(step)? {
			return Ok(outcome);
		}
		let action = self.actions.register_token(
			&self.key.token_symbol,
			self.plan.sz_decimals,
			self.plan.wei_decimals,
			self.plan.max_gas,
			self.plan.full_name.as_deref(),
		)?;
		self.execute(step, action).await
	}

	/// Step 2 with the allocations of the plan.
	pub async fn user_genesis_from_plan(&mut self) -> Result<StepOutcome, PipelineError> {
		let users: Vec<GenesisAllocation> = self
			.plan
			.user_genesis
			.iter()
			.map(|e| GenesisAllocation {
				address: e.address.clone(),
				wei: e.wei.clone(),
			})
			.collect();
		let existing: Vec<ExistingTokenAllocation> = self
			.plan
			.existing_token_genesis
			.iter()
			.map(|e| ExistingTokenAllocation {
				token: e.token,
				wei: e.wei.clone(),
			})
			.collect();
		self.user_genesis(&users, &existing).await
	}

	/// Step 2: allocate genesis balances.
	///
	/// Allocations already recorded are dropped from the action; if none are
	/// left nothing is sent.
	pub async fn user_genesis(
		&mut self,
		users: &[GenesisAllocation],
		existing: &[ExistingTokenAllocation],
	) -> Result<StepOutcome, PipelineError> {
		let step = DeployStep::UserGenesis;
		let transition = self.transition(step)?;
		let token = self.token_index()?;

		if users.is_empty()
			&& existing.is_empty()
			&& self.record.furthest_state >= DeployStage::UserGenesisApplied
		{
			let state = self.current_state()?;
			return Ok(match transition {
				Transition::Issue => StepOutcome::Skipped(state),
				Transition::AlreadyRecorded => StepOutcome::AlreadyRecorded(state),
			});
		}

		let mut action = self.actions.user_genesis(token, users, existing)?;
		let Action::SpotDeployUserGenesis(genesis) = &mut action else {
			return Err(PipelineError::InvariantViolation(
				"user genesis builder returned another action".into(),
			));
		};
		let record = &self.record;
		genesis.user_and_wei.retain(|(address, wei)| {
			!record.has_allocation(&GenesisAllocation {
				address: address.clone(),
				wei: wei.clone(),
			})
		});
		genesis.existing_token_and_wei.retain(|(token, wei)| {
			!record.has_existing_allocation(&ExistingTokenAllocation {
				token: *token,
				wei: wei.clone(),
			})
		});
		let nothing_new = genesis.user_and_wei.is_empty() && genesis.existing_token_and_wei.is_empty();

		match (transition, nothing_new) {
			(Transition::AlreadyRecorded, true) => {
				Ok(StepOutcome::AlreadyRecorded(self.current_state()?))
			},
			(Transition::AlreadyRecorded, false) => Err(PipelineError::InvariantViolation(
				"genesis is finalized; no further allocations can be added".into(),
			)),
			(Transition::Issue, true) => {
				tracing::info!(step = %step, "Every allocation is already recorded");
				self.log(
					step,
					None,
					DeployLogEvent::Skipped {
						reason: "allocations already recorded".into(),
					},
				)
				.await?;
				Ok(StepOutcome::Skipped(self.current_state()?))
			},
			(Transition::Issue, false) => self.execute(step, action).await,
		}
	}

	/// Step 3: finalize the max supply.
	///
	/// When every allocation went through this record, their total must equal
	/// the max supply before anything is sent.
	pub async fn genesis(&mut self) -> Result<StepOutcome, PipelineError> {
		let step = DeployStep::Genesis;
		if let Some(outcome) = self.precheck(step)? {
			return Ok(outcome);
		}
		let token = self.token_index()?;

		if self.record.allocations_tracked {
			let tracked = self
				.record
				.tracked_supply()
				.map_err(PipelineError::InvariantViolation)?;
			let max_supply = parse_wei(&self.plan.max_supply).map_err(PipelineError::Validation)?;
			if tracked != max_supply {
				return Err(PipelineError::SupplyMismatch {
					tracked: tracked.to_string(),
					max_supply: max_supply.to_string(),
				});
			}
		}

		let action = self
			.actions
			.genesis(token, &self.plan.max_supply, self.plan.no_hyperliquidity)?;
		self.execute(step, action).await
	}

	/// Step 4: register the spot pair and record its index.
	pub async fn register_spot(&mut self) -> Result<StepOutcome, PipelineError> {
		let step = DeployStep::RegisterSpot;
		if let Some(outcome) = self.precheck(step)? {
			return Ok(outcome);
		}
		let token = self.token_index()?;
		let action = self.actions.register_spot(token, self.plan.quote_token)?;
		self.execute(step, action).await
	}

	/// Step 5: register hyperliquidity.
	///
	/// If genesis disabled hyperliquidity the plan must place zero orders.
	pub async fn register_hyperliquidity(&mut self) -> Result<StepOutcome, PipelineError> {
		let step = DeployStep::RegisterHyperliquidity;
		if let Some(outcome) = self.precheck(step)? {
			return Ok(outcome);
		}
		let spot = self.record.spot_index.ok_or_else(|| {
			PipelineError::InvariantViolation("spot registered without a spot index".into())
		})?;

		let hyperliquidity = &self.plan.hyperliquidity;
		let no_hyperliquidity = self
			.record
			.no_hyperliquidity
			.unwrap_or(self.plan.no_hyperliquidity);
		if no_hyperliquidity && hyperliquidity.n_orders != 0 {
			return Err(PipelineError::InvariantViolation(format!(
				"genesis disabled hyperliquidity, so n_orders must be 0 (got {})",
				hyperliquidity.n_orders
			)));
		}

		let action = self.actions.register_hyperliquidity(
			spot,
			&hyperliquidity.start_px,
			&hyperliquidity.order_sz,
			hyperliquidity.n_orders,
			hyperliquidity.n_seeded_levels,
		)?;
		self.execute(step, action).await
	}

	/// Requests and, if the plan says how, finalizes the EVM contract link.
	pub async fn link_evm_contract_from_plan(&mut self) -> Result<Option<StepOutcome>, PipelineError> {
		let Some(evm) = self.plan.evm_contract.clone() else {
			return Ok(None);
		};
		let mut outcome = self
			.request_evm_contract(&evm.address, evm.evm_extra_wei_decimals)
			.await?;
		if let Some(finalize) = evm.finalize {
			let input = match finalize {
				EvmFinalizePlan::FirstStorageSlot => FinalizeEvmContractInput::FirstStorageSlot,
				EvmFinalizePlan::Create { nonce } => FinalizeEvmContractInput::Create { nonce },
			};
			outcome = self.finalize_evm_contract(input).await?;
		}
		Ok(Some(outcome))
	}

	/// Requests a link between the token and an EVM contract.
	pub async fn request_evm_contract(
		&mut self,
		address: &str,
		evm_extra_wei_decimals: u8,
	) -> Result<StepOutcome, PipelineError> {
		let step = DeployStep::RequestEvmContract;
		self.transition(step)?;
		let token = self.token_index()?;
		let action = self
			.actions
			.request_evm_contract(token, address, evm_extra_wei_decimals)?;

		if let (Some(link), Action::SpotDeployRequestEvmContract(request)) =
			(&self.record.evm_contract, &action)
		{
			if link.address == request.address
				&& link.evm_extra_wei_decimals == request.evm_extra_wei_decimals
			{
				return Ok(StepOutcome::AlreadyRecorded(self.current_state()?));
			}
			if link.finalized {
				return Err(PipelineError::InvariantViolation(format!(
					"token is already linked to {}",
					link.address
				)));
			}
		}
		self.execute(step, action).await
	}

	/// Finalizes the requested EVM contract link.
	pub async fn finalize_evm_contract(
		&mut self,
		input: FinalizeEvmContractInput,
	) -> Result<StepOutcome, PipelineError> {
		let step = DeployStep::FinalizeEvmContract;
		self.transition(step)?;
		let token = self.token_index()?;
		match &self.record.evm_contract {
			None => {
				return Err(PipelineError::InvariantViolation(
					"request the EVM contract link before finalizing it".into(),
				))
			},
			Some(link) if link.finalized => {
				return Ok(StepOutcome::AlreadyRecorded(self.current_state()?))
			},
			Some(_) => {},
		}
		let action = self.actions.finalize_evm_contract(token, input)?;
		self.execute(step, action).await
	}

	/// Checks legality and a pending marker; returns the outcome when the step
	/// is already recorded.
	fn precheck(&self, step: DeployStep) -> Result<Option<StepOutcome>, PipelineError> {
		match self.transition(step)? {
			Transition::Issue => Ok(None),
			Transition::AlreadyRecorded => {
				tracing::debug!(step = %step, "Step already recorded");
				Ok(Some(StepOutcome::AlreadyRecorded(self.current_state()?)))
			},
		}
	}

	fn transition(&self, step: DeployStep) -> Result<Transition, PipelineError> {
		if let Some(pending) = &self.record.pending {
			return Err(PipelineError::UncertainOutcome {
				step: pending.step.to_string(),
				nonce: pending.nonce,
				reason: "a previous step is still pending".into(),
			});
		}
		DeployStateMachine::check(self.record.furthest_state, step)
	}

	fn token_index(&self) -> Result<u32, PipelineError> {
		self.record.token_index.ok_or_else(|| {
			PipelineError::InvariantViolation("token registered without a token index".into())
		})
	}

	fn checkpoint(&self) -> Result<(), PipelineError> {
		if *self.cancel.borrow() {
			tracing::warn!(deployment = %self.key, "Cancellation requested");
			return Err(PipelineError::Cancelled);
		}
		Ok(())
	}

	async fn log(
		&self,
		step: DeployStep,
		nonce: Option<Nonce>,
		event: DeployLogEvent,
	) -> Result<(), PipelineError> {
		self.state.log(&self.key, step, nonce, event).await
	}

	async fn lookup_identifier(&self, step: DeployStep) -> Result<Option<u32>, PipelineError> {
		match step {
			DeployStep::RegisterToken => self.reconciler.token_index(&self.record).await,
			DeployStep::RegisterSpot => self.reconciler.spot_index(&self.record).await,
			_ => Ok(None),
		}
	}

	/// Signs, records as pending, sends and interprets one step.
	#[instrument(skip_all, fields(deployment = %self.key, step = %step))]
	async fn execute(&mut self, step: DeployStep, action: Action) -> Result<StepOutcome, PipelineError> {
		self.checkpoint()?;

		let request = self.submitter.sign(action).await?;
		let nonce = Nonce(request.nonce);

		self.record.pending = Some(PendingStep {
			step,
			nonce,
			action: request.action.clone(),
			started_at: current_timestamp(),
		});
		self.state.save(&mut self.record).await?;
		self.log(step, Some(nonce), DeployLogEvent::Dispatched).await?;
		tracing::info!(%nonce, "Dispatching step");

		match self.submitter.dispatch(&request).await {
			Ok(DispatchOutcome::Accepted { data }) => {
				let identifier = data
					.as_ref()
					.and_then(|d| d.as_u64())
					.and_then(|v| u32::try_from(v).ok());
				self.log(step, Some(nonce), DeployLogEvent::Accepted { data })
					.await?;
				let identifier = self.resolve_identifier(step, identifier).await;
				if step.yields_identifier() && identifier.is_none() {
					return Err(PipelineError::UncertainOutcome {
						step: step.to_string(),
						nonce,
						reason: "accepted without an index; it will be looked up on the next run"
							.into(),
					});
				}
				DeployStateMachine::apply(&mut self.record, &request.action, identifier)?;
				self.state.save(&mut self.record).await?;
				let state = self.current_state()?;
				tracing::info!(state = %state, "Step applied");
				Ok(StepOutcome::Applied(state))
			},
			Ok(DispatchOutcome::Rejected { reason }) => match self.classifier.classify(&reason) {
				Rejection::AlreadyCompleted(reason) => {
					self.log(
						step,
						Some(nonce),
						DeployLogEvent::AlreadyCompleted {
							reason: reason.clone(),
						},
					)
					.await?;
					let identifier = self.resolve_identifier(step, None).await;
					if step.yields_identifier() && identifier.is_none() {
						self.record.pending = None;
						self.state.save(&mut self.record).await?;
						return Err(PipelineError::Rejected(format!(
							"{} (no matching deployment found for this account)",
							reason
						)));
					}
					DeployStateMachine::apply(&mut self.record, &request.action, identifier)?;
					if step == DeployStep::RegisterToken {
						// Earlier allocations may exist that this record never saw.
						self.record.allocations_tracked = false;
					}
					self.state.save(&mut self.record).await?;
					let state = self.current_state()?;
					tracing::info!(state = %state, reason = %reason, "Step was already completed");
					Ok(StepOutcome::AlreadyCompleted(state))
				},
				Rejection::Genuine(reason) => {
					self.log(
						step,
						Some(nonce),
						DeployLogEvent::Rejected {
							reason: reason.clone(),
						},
					)
					.await?;
					self.record.pending = None;
					self.state.save(&mut self.record).await?;
					Err(PipelineError::Rejected(reason))
				},
			},
			Err(error) => {
				let event = match &error {
					e if e.may_have_landed() => DeployLogEvent::Uncertain {
						reason: e.to_string(),
					},
					DeliveryError::Http { .. } => DeployLogEvent::Rejected {
						reason: error.to_string(),
					},
					e => DeployLogEvent::Undelivered {
						reason: e.to_string(),
					},
				};
				let pipeline_error = PipelineError::from_delivery(error, Some(step), nonce);
				if !pipeline_error.is_uncertain() {
					self.record.pending = None;
					self.state.save(&mut self.record).await?;
				}
				self.log(step, Some(nonce), event).await?;
				Err(pipeline_error)
			},
		}
	}

	/// Uses the identifier from the response, falling back to a remote lookup.
	async fn resolve_identifier(&self, step: DeployStep, from_response: Option<u32>) -> Option<u32> {
		if !step.yields_identifier() {
			return None;
		}
		if from_response.is_some() {
			return from_response;
		}
		match self.lookup_identifier(step).await {
			Ok(identifier) => identifier,
			Err(e) => {
				tracing::warn!(error = %e, "Could not look up index");
				None
			},
		}
	}
}
