//! Common types module for the spot deployer.
//!
//! This module defines the value types shared by every deployer component:
//! chains and networks, the typed exchange actions, signatures, the durable
//! deployment record and the wire shapes exchanged with the remote verifier.
//! None of these types perform I/O.

/// Signature and account-related value types.
pub mod account;
/// Exchange actions and their signing schemas.
pub mod action;
/// Request and response shapes of the exchange HTTP API.
pub mod api;
/// Chain and network identifiers.
pub mod chain;
/// Durable deployment records and state-machine stages.
pub mod deploy;
/// Anti-replay nonces.
pub mod nonce;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Redacted container for signing key material.
pub mod secret;
/// Storage namespaces.
pub mod storage;
/// EIP-712 typed-data model and encoder.
pub mod typed_data;
/// Utility functions for common type conversions.
pub mod utils;

pub use account::Signature;
pub use action::{
	Action, ActionKind, FinalizeEvmContractInput, SendToEvmWithData, SignatureChainId,
	SpotDeployFinalizeEvmContract, SpotDeployGenesis, SpotDeployRegisterHyperliquidity, SpotDeployRegisterSpot,
	SpotDeployRegisterToken, SpotDeployRequestEvmContract, SpotDeployUserGenesis, SpotSend,
};
pub use api::{
	DispatchOutcome, ExchangeRequest, ExchangeResponse, InfoRequest, RemoteDeployState,
	RemoteTokenDeployState, RemoteTokenSpec, ResponseStatus,
};
pub use chain::{Chain, ChainError, ChainFamily, Network};
pub use deploy::{
	DeployKey, DeployLogEntry, DeployLogEvent, DeployRecord, DeployStage, DeployState, DeployStep,
	EvmContractLink, ExistingTokenAllocation, GenesisAllocation, PendingStep,
};
pub use nonce::Nonce;
pub use registry::ImplementationRegistry;
pub use secret::SecretKey;
pub use storage::StorageKey;
pub use typed_data::{
	EncodedStructure, Eip712Type, Eip712Value, FieldSpec, SigningDomain, TypedData,
	TypedDataError, TypedMessage,
};
pub use utils::{current_timestamp, truncate_id, with_0x_prefix, without_0x_prefix};
