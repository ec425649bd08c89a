//! Reconciliation of steps whose outcome is unknown.
//!
//! When a signed step was handed to the dispatcher but no verdict came back,
//! the record keeps a pending marker. Before anything else runs for that key
//! the pending step is compared with the exchange's own view of the deployment
//! (`spotDeployState`).

use crate::PipelineError;
use alloy_primitives::Address;
use deployer_delivery::DeliveryService;
use deployer_types::{Action, DeployRecord, PendingStep, RemoteDeployState};
use std::sync::Arc;
use tracing::instrument;

/// Verdict on a pending step after consulting remote state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileResult {
	/// The step was applied. Carries the token or spot index when the step
	/// yields one.
	Landed { identifier: Option<u32> },
	/// Remote state proves the step was not applied.
	NotLanded,
	/// Remote state cannot tell; an operator has to decide.
	Unknown,
}

/// Compares pending steps with the exchange's deploy state of one user.
pub struct Reconciler {
	delivery: Arc<DeliveryService>,
	user: Address,
}

impl Reconciler {
	pub fn new(delivery: Arc<DeliveryService>, user: Address) -> Self {
		Self { delivery, user }
	}

	/// Fetches remote state and judges `pending` against it.
	#[instrument(skip_all, fields(token = %record.token_symbol, step = %pending.step))]
	pub async fn reconcile(
		&self,
		record: &DeployRecord,
		pending: &PendingStep,
	) -> Result<ReconcileResult, PipelineError> {
		let remote = self
			.delivery
			.spot_deploy_state(self.user)
			.await
			.map_err(|e| PipelineError::TransientNetwork(e.to_string()))?;
		let result = judge(record, &pending.action, &remote);
		tracing::info!(?result, "Reconciled pending step");
		Ok(result)
	}

	/// Looks up the index the exchange assigned to the token of `record`.
	pub async fn token_index(&self, record: &DeployRecord) -> Result<Option<u32>, PipelineError> {
		let remote = self
			.delivery
			.spot_deploy_state(self.user)
			.await
			.map_err(|e| PipelineError::TransientNetwork(e.to_string()))?;
		Ok(remote.find_by_name(&record.token_symbol).map(|s| s.token))
	}

	/// Looks up the spot index of the token of `record`.
	pub async fn spot_index(&self, record: &DeployRecord) -> Result<Option<u32>, PipelineError> {
		let Some(token) = record.token_index else {
			return Ok(None);
		};
		let remote = self
			.delivery
			.spot_deploy_state(self.user)
			.await
			.map_err(|e| PipelineError::TransientNetwork(e.to_string()))?;
		Ok(remote
			.find_by_token(token)
			.and_then(|s| s.spots.first().copied()))
	}
}

/// Decides whether `action` is reflected in `remote`.
///
/// A token that is no longer listed may have finished deploying, so its
/// absence only proves anything for the registration itself.
pub fn judge(record: &DeployRecord, action: &Action, remote: &RemoteDeployState) -> ReconcileResult {
	match action {
		Action::SpotDeployRegisterToken(a) => match remote.find_by_name(&a.name) {
			Some(state) => ReconcileResult::Landed {
				identifier: Some(state.token),
			},
			None if record.token_index.is_none() => ReconcileResult::NotLanded,
			None => ReconcileResult::Unknown,
		},
		Action::SpotDeployUserGenesis(a) => {
			let Some(state) = remote.find_by_token(a.token) else {
				return ReconcileResult::Unknown;
			};
			let users = a
				.user_and_wei
				.iter()
				.map(|(address, wei)| state.has_user_balance(address, wei));
			let existing = a
				.existing_token_and_wei
				.iter()
				.map(|(token, wei)| {
					state
						.existing_token_genesis_balances
						.iter()
						.any(|(t, w)| t == token && w == wei)
				});
			let present: Vec<bool> = users.chain(existing).collect();
			if present.iter().all(|p| *p) {
				ReconcileResult::Landed { identifier: None }
			} else if present.iter().all(|p| !*p) {
				ReconcileResult::NotLanded
			} else {
				ReconcileResult::Unknown
			}
		},
		Action::SpotDeployGenesis(a) => match remote.find_by_token(a.token) {
			Some(state) if state.max_supply.is_some() => {
				ReconcileResult::Landed { identifier: None }
			},
			Some(_) => ReconcileResult::NotLanded,
			None => ReconcileResult::Unknown,
		},
		Action::SpotDeployRegisterSpot(a) => match remote.find_by_token(a.tokens[0]) {
			Some(state) => match state.spots.first() {
				Some(spot) => ReconcileResult::Landed {
					identifier: Some(*spot),
				},
				None => ReconcileResult::NotLanded,
			},
			None => ReconcileResult::Unknown,
		},
		// Remote deploy state carries nothing about these.
		Action::SpotDeployRegisterHyperliquidity(_)
		| Action::SpotDeployRequestEvmContract(_)
		| Action::SpotDeployFinalizeEvmContract(_)
		| Action::SpotSend(_)
		| Action::SendToEvmWithData(_) => ReconcileResult::Unknown,
	}
}
