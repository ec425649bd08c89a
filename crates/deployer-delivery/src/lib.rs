//! Remote dispatch module for the spot deployer.
//!
//! This module sends signed actions to the exchange and reads back deploy
//! state. Transport failures are classified by whether the request could have
//! reached the exchange: only requests that provably never left are retried
//! for writes, while the read-only info query is retried on any transient
//! failure.

use alloy_primitives::Address;
use async_trait::async_trait;
use backoff::{exponential::ExponentialBackoffBuilder, ExponentialBackoff};
use deployer_types::{
	utils::lower_hex_address, DispatchOutcome, ExchangeRequest, ExchangeResponse,
	ImplementationRegistry, InfoRequest, RemoteDeployState,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Re-export implementations
pub mod implementations {
	pub mod http;
	#[cfg(any(test, feature = "test-utils"))]
	pub mod mock;
}

/// Errors that can occur while talking to the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
	/// The request never left this process (connection refused, DNS failure,
	/// request construction). Safe to retry.
	#[error("Network error: {0}")]
	Network(String),
	/// The request may have reached the exchange but no usable answer came
	/// back (timeout after send, dropped connection, unreadable body).
	#[error("Uncertain outcome: {0}")]
	Uncertain(String),
	/// The exchange answered with a non-success HTTP status.
	#[error("HTTP {status}: {body}")]
	Http { status: u16, body: String },
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl DeliveryError {
	/// Whether the exchange may have applied the request.
	pub fn may_have_landed(&self) -> bool {
		match self {
			DeliveryError::Network(_) | DeliveryError::Configuration(_) => false,
			DeliveryError::Uncertain(_) => true,
			DeliveryError::Http { status, .. } => *status >= 500,
		}
	}
}

/// Trait defining the interface for exchange transports.
#[async_trait]
pub trait DispatchInterface: Send + Sync {
	/// Sends a signed action to `POST {base}/exchange`.
	async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, DeliveryError>;

	/// Sends a read-only query to `POST {base}/info`.
	async fn info(&self, request: &InfoRequest) -> Result<serde_json::Value, DeliveryError>;
}

/// Type alias for dispatch factory functions.
pub type DispatchFactory = fn(&toml::Value) -> Result<Box<dyn DispatchInterface>, DeliveryError>;

/// Registry trait for dispatch implementations.
pub trait DispatchRegistry: ImplementationRegistry<Factory = DispatchFactory> {}

/// Get all registered dispatch implementations.
pub fn get_all_implementations() -> Vec<(&'static str, DispatchFactory)> {
	use implementations::http;

	#[allow(unused_mut)]
	let mut implementations = vec![(http::Registry::NAME, http::Registry::factory())];
	// Scripted dispatcher, only selectable in test builds.
	#[cfg(any(test, feature = "test-utils"))]
	implementations.push((
		implementations::mock::Registry::NAME,
		implementations::mock::Registry::factory(),
	));
	implementations
}

/// Exponential backoff settings for retryable calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
	pub initial_interval: Duration,
	pub multiplier: f64,
	pub max_interval: Duration,
	/// Give up once retries have taken this long in total.
	pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			initial_interval: Duration::from_millis(250),
			multiplier: 1.75,
			max_interval: Duration::from_secs(10),
			max_elapsed: Duration::from_secs(60),
		}
	}
}

impl RetryPolicy {
	/// A policy that gives up almost immediately, for tests.
	pub fn immediate() -> Self {
		Self {
			initial_interval: Duration::from_millis(1),
			multiplier: 1.1,
			max_interval: Duration::from_millis(5),
			max_elapsed: Duration::from_millis(50),
		}
	}

	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.initial_interval)
			.with_multiplier(self.multiplier)
			.with_max_interval(self.max_interval)
			.with_max_elapsed_time(Some(self.max_elapsed))
			.build()
	}
}

/// Service that delivers signed actions and answers deploy-state queries.
pub struct DeliveryService {
	implementation: Box<dyn DispatchInterface>,
	retry: RetryPolicy,
}

impl DeliveryService {
	pub fn new(implementation: Box<dyn DispatchInterface>, retry: RetryPolicy) -> Self {
		Self {
			implementation,
			retry,
		}
	}

	/// Dispatches a signed action and interprets the response envelope.
	///
	/// Retries only while the failure proves the request never left. Any other
	/// failure is returned immediately so the caller can decide how to settle
	/// a possibly applied action.
	#[instrument(skip_all, fields(action = %request.action.kind(), nonce = request.nonce))]
	pub async fn dispatch(&self, request: &ExchangeRequest) -> Result<DispatchOutcome, DeliveryError> {
		let response = backoff::future::retry(self.retry.backoff(), || async {
			self.implementation.exchange(request).await.map_err(|e| match e {
				DeliveryError::Network(_) => {
					warn!(error = %e, "Exchange unreachable, retrying");
					backoff::Error::transient(e)
				},
				other => backoff::Error::permanent(other),
			})
		})
		.await?;

		let outcome = response.into_outcome();
		debug!(?outcome, "Exchange responded");
		Ok(outcome)
	}

	/// Reads the in-progress spot deployments of `user`.
	///
	/// The query has no side effects, so every transient failure is retried.
	#[instrument(skip_all, fields(user = %user))]
	pub async fn spot_deploy_state(&self, user: Address) -> Result<RemoteDeployState, DeliveryError> {
		let request = InfoRequest::SpotDeployState {
			user: lower_hex_address(&user),
		};
		let value = backoff::future::retry(self.retry.backoff(), || async {
			self.implementation.info(&request).await.map_err(|e| match e {
				DeliveryError::Configuration(_) => backoff::Error::permanent(e),
				DeliveryError::Http { status, .. } if status < 500 => backoff::Error::permanent(e),
				other => {
					warn!(error = %other, "Info query failed, retrying");
					backoff::Error::transient(other)
				},
			})
		})
		.await?;

		// The exchange answers `null` when the user has no deployments.
		if value.is_null() {
			return Ok(RemoteDeployState::default());
		}
		serde_json::from_value(value)
			.map_err(|e| DeliveryError::Uncertain(format!("Invalid spotDeployState response: {}", e)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use deployer_types::{
		Action, ExchangeResponse, Nonce, ResponseStatus, Signature, SignatureChainId,
		SpotDeployRegisterSpot,
	};
	use implementations::mock::MockDispatcher;
	use serde_json::json;

	fn request() -> ExchangeRequest {
		let mut action = Action::SpotDeployRegisterSpot(SpotDeployRegisterSpot {
			signature_chain_id: SignatureChainId(0x66eee),
			hyperliquid_chain: "Testnet".to_string(),
			tokens: [1562, 0],
			nonce: 0,
		});
		action.stamp(Nonce(42));
		ExchangeRequest {
			action,
			nonce: 42,
			signature: Signature {
				r: Default::default(),
				s: Default::default(),
				v: 27,
			},
			vault_address: None,
		}
	}

	fn ok(data: u64) -> ExchangeResponse {
		ExchangeResponse {
			status: ResponseStatus::Ok,
			response: json!({"type": "default", "data": data}),
		}
	}

	#[tokio::test]
	async fn test_connect_failures_are_retried() {
		let mock = MockDispatcher::new();
		mock.push_exchange(Err(DeliveryError::Network("refused".into())));
		mock.push_exchange(Ok(ok(1436)));
		let service = DeliveryService::new(Box::new(mock.clone()), RetryPolicy::immediate());

		let outcome = service.dispatch(&request()).await.unwrap();
		assert_eq!(outcome.identifier(), Some(1436));
		assert_eq!(mock.exchange_requests().len(), 2);
	}

	#[tokio::test]
	async fn test_uncertain_failures_are_not_retried() {
		let mock = MockDispatcher::new();
		mock.push_exchange(Err(DeliveryError::Uncertain("timed out".into())));
		mock.push_exchange(Ok(ok(1436)));
		let service = DeliveryService::new(Box::new(mock.clone()), RetryPolicy::immediate());

		let err = service.dispatch(&request()).await.unwrap_err();
		assert!(err.may_have_landed());
		assert_eq!(mock.exchange_requests().len(), 1);
	}

	#[tokio::test]
	async fn test_info_query_retries_uncertain_failures() {
		let mock = MockDispatcher::new();
		mock.push_info(Err(DeliveryError::Uncertain("reset".into())));
		mock.push_info(Ok(json!({"states": [{
			"token": 1562,
			"spec": {"name": "TEST0", "szDecimals": 2, "weiDecimals": 8}
		}]})));
		let service = DeliveryService::new(Box::new(mock.clone()), RetryPolicy::immediate());

		let state = service.spot_deploy_state(Address::ZERO).await.unwrap();
		assert_eq!(state.find_by_name("TEST0").map(|s| s.token), Some(1562));
		assert_eq!(mock.info_requests().len(), 2);
	}

	#[tokio::test]
	async fn test_null_info_is_empty_state() {
		let mock = MockDispatcher::new();
		mock.push_info(Ok(serde_json::Value::Null));
		let service = DeliveryService::new(Box::new(mock), RetryPolicy::immediate());
		let state = service.spot_deploy_state(Address::ZERO).await.unwrap();
		assert!(state.states.is_empty());
	}

	#[test]
	fn test_mock_registered_only_in_test_builds() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["http", "mock"]);
		assert_eq!(cfg!(feature = "test-utils") || cfg!(test), names.contains(&"mock"));
	}

	#[test]
	fn test_landing_classification() {
		assert!(!DeliveryError::Network("x".into()).may_have_landed());
		assert!(DeliveryError::Uncertain("x".into()).may_have_landed());
		assert!(DeliveryError::Http {
			status: 502,
			body: String::new()
		}
		.may_have_landed());
		assert!(!DeliveryError::Http {
			status: 422,
			body: String::new()
		}
		.may_have_landed());
	}
}
