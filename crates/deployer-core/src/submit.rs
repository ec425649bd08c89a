//! Stamping, signing and delivery of single actions.

use crate::nonce::NonceClock;
use crate::PipelineError;
use alloy_primitives::Address;
use deployer_account::AccountService;
use deployer_delivery::{DeliveryError, DeliveryService};
use deployer_types::{Action, DispatchOutcome, ExchangeRequest, Nonce};
use std::sync::Arc;
use tracing::instrument;

/// Turns unsigned actions into signed exchange requests and sends them.
///
/// One submitter is shared by every pipeline of a process so all of them
/// draw nonces from the same clock.
pub struct ActionSubmitter {
	account: Arc<AccountService>,
	delivery: Arc<DeliveryService>,
	clock: Arc<NonceClock>,
	vault_address: Option<String>,
}

impl ActionSubmitter {
	pub fn new(
		account: Arc<AccountService>,
		delivery: Arc<DeliveryService>,
		clock: Arc<NonceClock>,
		vault_address: Option<String>,
	) -> Self {
		Self {
			account,
			delivery,
			clock,
			vault_address,
		}
	}

	pub fn delivery(&self) -> &Arc<DeliveryService> {
		&self.delivery
	}

	/// Address of the signing account.
	pub async fn address(&self) -> Result<Address, PipelineError> {
		Ok(self.account.get_address().await?)
	}

	/// Stamps a fresh nonce into `action` and signs it.
	pub async fn sign(&self, mut action: Action) -> Result<ExchangeRequest, PipelineError> {
		let nonce = self.clock.next();
		action.stamp(nonce);
		self.sign_stamped(action).await
	}

	/// Signs `action` with the nonce it already carries.
	pub async fn sign_stamped(&self, action: Action) -> Result<ExchangeRequest, PipelineError> {
		let typed_data = action.typed_data();
		tracing::trace!(envelope = %typed_data.to_envelope(), "Signing typed data");
		let encoded = typed_data.encode()?;
		let signature = self.account.sign(&encoded).await?;

		Ok(ExchangeRequest {
			nonce: action.nonce().as_u64(),
			action,
			signature,
			vault_address: self.vault_address.clone(),
		})
	}

	pub async fn dispatch(&self, request: &ExchangeRequest) -> Result<DispatchOutcome, DeliveryError> {
		self.delivery.dispatch(request).await
	}

	/// Signs and sends a one-off action outside any deploy pipeline.
	///
	/// A rejection is returned as [`PipelineError::Rejected`].
	#[instrument(skip_all, fields(action = %action.kind()))]
	pub async fn submit(&self, action: Action) -> Result<(Nonce, DispatchOutcome), PipelineError> {
		let request = self.sign(action).await?;
		let nonce = Nonce(request.nonce);
		match self.dispatch(&request).await {
			Ok(DispatchOutcome::Rejected { reason }) => Err(PipelineError::Rejected(reason)),
			Ok(outcome) => {
				tracing::info!(%nonce, "Action accepted");
				Ok((nonce, outcome))
			},
			Err(e) => Err(PipelineError::from_delivery(e, None, nonce)),
		}
	}
}
