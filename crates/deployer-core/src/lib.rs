//! Core deploy engine for the spot deployer.
//!
//! This module ties the other crates together: it builds and validates
//! actions, stamps them with nonces, signs and delivers them, and drives the
//! five-step spot-deploy procedure as a resumable state machine whose progress
//! is persisted before every network call.

use deployer_account::AccountError;
use deployer_delivery::DeliveryError;
use deployer_storage::StorageError;
use deployer_types::{DeployStage, DeployStep, Nonce, TypedDataError};
use thiserror::Error;

pub mod actions;
pub mod builder;
pub mod classifier;
pub mod nonce;
pub mod pipeline;
pub mod recovery;
pub mod state;
pub mod submit;

pub use actions::{ActionBuilder, ActionError, SendToEvmParams};
pub use builder::{Deployer, DeployerBuilder, DeployerFactories};
pub use classifier::{Rejection, RejectionClassifier};
pub use nonce::{NonceClock, NonceError, SystemTimeSource, TimeSource};
pub use pipeline::{DeployPipeline, OperatorVerdict, StepOutcome};
pub use recovery::{ReconcileResult, Reconciler};
pub use state::{DeployStateMachine, Transition};
pub use submit::ActionSubmitter;

/// Errors that stop a step or a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
	/// Bad key, unknown chain or missing settings. Raised before any network call.
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// Malformed address, amount or schema. Nothing was sent.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The exchange could not be reached and the request never left.
	#[error("Exchange unreachable: {0}")]
	TransientNetwork(String),
	/// The exchange refused the action; the reason is verbatim.
	#[error("Rejected by exchange: {0}")]
	Rejected(String),
	#[error("Invariant violation: {0}")]
	InvariantViolation(String),
	#[error("Step {step} is not allowed at stage {stage}")]
	StepOutOfOrder { step: DeployStep, stage: DeployStage },
	#[error("Tracked genesis allocations total {tracked} wei but max supply is {max_supply}")]
	SupplyMismatch { tracked: String, max_supply: String },
	/// The step may have been applied. Resolve by reconciliation or an
	/// explicit operator confirmation before continuing.
	#[error("Outcome of {step} with nonce {nonce} is unknown: {reason}")]
	UncertainOutcome {
		step: String,
		nonce: Nonce,
		reason: String,
	},
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Deployment is locked by another process: {0}")]
	LeaseHeld(String),
	#[error("Cancelled")]
	Cancelled,
}

impl PipelineError {
	/// Classifies a delivery failure of the request carrying `nonce`.
	pub(crate) fn from_delivery(error: DeliveryError, step: Option<DeployStep>, nonce: Nonce) -> Self {
		let step_name = || step.map_or_else(|| "action".to_string(), |s| s.to_string());
		if error.may_have_landed() {
			return PipelineError::UncertainOutcome {
				step: step_name(),
				nonce,
				reason: error.to_string(),
			};
		}
		match error {
			DeliveryError::Network(reason) => PipelineError::TransientNetwork(reason),
			DeliveryError::Http { status, body } => {
				PipelineError::Rejected(format!("HTTP {}: {}", status, body))
			},
			DeliveryError::Configuration(reason) => PipelineError::Configuration(reason),
			DeliveryError::Uncertain(reason) => PipelineError::UncertainOutcome {
				step: step_name(),
				nonce,
				reason,
			},
		}
	}

	/// Whether the failed step may still land on the exchange.
	pub fn is_uncertain(&self) -> bool {
		matches!(self, PipelineError::UncertainOutcome { .. })
	}
}

impl From<StorageError> for PipelineError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::LeaseHeld(key) => PipelineError::LeaseHeld(key),
			other => PipelineError::Storage(other.to_string()),
		}
	}
}

impl From<ActionError> for PipelineError {
	fn from(err: ActionError) -> Self {
		PipelineError::Validation(err.to_string())
	}
}

impl From<TypedDataError> for PipelineError {
	fn from(err: TypedDataError) -> Self {
		PipelineError::Validation(err.to_string())
	}
}

impl From<AccountError> for PipelineError {
	fn from(err: AccountError) -> Self {
		match err {
			AccountError::InvalidKey(_) | AccountError::Implementation(_) => {
				PipelineError::Configuration(err.to_string())
			},
			AccountError::SigningFailed(_) | AccountError::RecoveryFailed(_) => {
				PipelineError::Validation(err.to_string())
			},
		}
	}
}

impl From<NonceError> for PipelineError {
	fn from(err: NonceError) -> Self {
		PipelineError::Configuration(err.to_string())
	}
}

/// A pipeline that stopped, with the furthest stage it durably reached so the
/// operator knows where a rerun resumes.
#[derive(Debug, Error)]
#[error("{error} (furthest state: {furthest_state})")]
pub struct PipelineFailure {
	pub furthest_state: DeployStage,
	#[source]
	pub error: PipelineError,
}
