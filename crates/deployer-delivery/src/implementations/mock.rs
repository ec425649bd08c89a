//! Scripted in-process dispatcher.
//!
//! Responses are queued ahead of time and handed out in order; every request
//! is recorded so tests can assert on what was (or was not) sent. When the
//! exchange queue is empty the dispatcher answers a plain `ok`.

use crate::{DeliveryError, DispatchFactory, DispatchInterface, DispatchRegistry};
use async_trait::async_trait;
use deployer_types::{
	ExchangeRequest, ExchangeResponse, ImplementationRegistry, InfoRequest, ResponseStatus,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
	exchange_script: VecDeque<Result<ExchangeResponse, DeliveryError>>,
	info_script: VecDeque<Result<serde_json::Value, DeliveryError>>,
	exchange_requests: Vec<ExchangeRequest>,
	info_requests: Vec<InfoRequest>,
}

/// Cloneable handle; clones share the same script and request log.
#[derive(Clone, Default)]
pub struct MockDispatcher {
	state: Arc<Mutex<MockState>>,
}

impl MockDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
		// A poisoned lock only means another test thread panicked.
		let mut guard = match self.state.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		f(&mut guard)
	}

	/// Queues the next `/exchange` result.
	pub fn push_exchange(&self, result: Result<ExchangeResponse, DeliveryError>) {
		self.with_state(|s| s.exchange_script.push_back(result));
	}

	/// Queues an accepted `/exchange` response carrying `data`.
	pub fn push_ok(&self, data: Option<u64>) {
		let response = match data {
			Some(data) => json!({"type": "default", "data": data}),
			None => json!({"type": "default"}),
		};
		self.push_exchange(Ok(ExchangeResponse {
			status: ResponseStatus::Ok,
			response,
		}));
	}

	/// Queues a rejected `/exchange` response with `reason`.
	pub fn push_err(&self, reason: &str) {
		self.push_exchange(Ok(ExchangeResponse {
			status: ResponseStatus::Err,
			response: json!(reason),
		}));
	}

	/// Queues the next `/info` result.
	pub fn push_info(&self, result: Result<serde_json::Value, DeliveryError>) {
		self.with_state(|s| s.info_script.push_back(result));
	}

	pub fn exchange_requests(&self) -> Vec<ExchangeRequest> {
		self.with_state(|s| s.exchange_requests.clone())
	}

	pub fn info_requests(&self) -> Vec<InfoRequest> {
		self.with_state(|s| s.info_requests.clone())
	}
}

#[async_trait]
impl DispatchInterface for MockDispatcher {
	async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, DeliveryError> {
		self.with_state(|s| {
			s.exchange_requests.push(request.clone());
			s.exchange_script.pop_front().unwrap_or_else(|| {
				Ok(ExchangeResponse {
					status: ResponseStatus::Ok,
					response: json!({"type": "default"}),
				})
			})
		})
	}

	async fn info(&self, request: &InfoRequest) -> Result<serde_json::Value, DeliveryError> {
		self.with_state(|s| {
			s.info_requests.push(request.clone());
			s.info_script
				.pop_front()
				.unwrap_or(Ok(serde_json::Value::Null))
		})
	}
}

/// Factory function to create an unscripted mock dispatcher.
pub fn create_dispatcher(_config: &toml::Value) -> Result<Box<dyn DispatchInterface>, DeliveryError> {
	Ok(Box::new(MockDispatcher::new()))
}

/// Registry for the mock dispatch implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = DispatchFactory;

	fn factory() -> Self::Factory {
		create_dispatcher
	}
}

impl DispatchRegistry for Registry {}
