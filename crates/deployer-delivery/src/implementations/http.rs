//! HTTP transport to the exchange API.

use crate::{DeliveryError, DispatchFactory, DispatchInterface, DispatchRegistry};
use async_trait::async_trait;
use deployer_types::{ExchangeRequest, ExchangeResponse, ImplementationRegistry, InfoRequest};
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Exchange client over `reqwest`.
pub struct HttpDispatcher {
	client: Client,
	base_url: String,
}

impl HttpDispatcher {
	pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
		let client = Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| DeliveryError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
		})
	}

	async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
		&self,
		path: &str,
		body: &B,
	) -> Result<T, DeliveryError> {
		let url = format!("{}/{}", self.base_url, path);
		let response = self
			.client
			.post(&url)
			.json(body)
			.send()
			.await
			.map_err(classify_send_error)?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(DeliveryError::Http {
				status: status.as_u16(),
				body,
			});
		}

		let bytes = response
			.bytes()
			.await
			.map_err(|e| DeliveryError::Uncertain(format!("Failed to read response body: {}", e)))?;
		serde_json::from_slice(&bytes).map_err(|e| {
			DeliveryError::Uncertain(format!(
				"Unparseable response: {} ({})",
				e,
				String::from_utf8_lossy(&bytes)
			))
		})
	}
}

/// Maps a `reqwest` send failure to whether the request could have landed.
fn classify_send_error(e: reqwest::Error) -> DeliveryError {
	if e.is_connect() || e.is_builder() {
		DeliveryError::Network(e.to_string())
	} else {
		DeliveryError::Uncertain(e.to_string())
	}
}

#[async_trait]
impl DispatchInterface for HttpDispatcher {
	async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse, DeliveryError> {
		tracing::trace!(
			payload = %serde_json::to_string(request).unwrap_or_default(),
			"POST /exchange"
		);
		self.post("exchange", request).await
	}

	async fn info(&self, request: &InfoRequest) -> Result<serde_json::Value, DeliveryError> {
		self.post("info", request).await
	}
}

/// Factory function to create an HTTP dispatcher from configuration.
///
/// Configuration parameters:
/// - `url`: base URL of the exchange API (required)
/// - `timeout_seconds`: per-request timeout (default: 10)
pub fn create_dispatcher(config: &toml::Value) -> Result<Box<dyn DispatchInterface>, DeliveryError> {
	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DeliveryError::Configuration("url is required".to_string()))?;
	if !(url.starts_with("http://") || url.starts_with("https://")) {
		return Err(DeliveryError::Configuration(format!(
			"url must be http(s): {}",
			url
		)));
	}

	let timeout_seconds = match config.get("timeout_seconds") {
		None => DEFAULT_TIMEOUT_SECONDS,
		Some(v) => v
			.as_integer()
			.filter(|secs| *secs > 0)
			.map(|secs| secs as u64)
			.ok_or_else(|| {
				DeliveryError::Configuration("timeout_seconds must be a positive integer".to_string())
			})?,
	};

	Ok(Box::new(HttpDispatcher::new(
		url,
		Duration::from_secs(timeout_seconds),
	)?))
}

/// Registry for the HTTP dispatch implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = DispatchFactory;

	fn factory() -> Self::Factory {
		create_dispatcher
	}
}

impl DispatchRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_factory_validates_config() {
		let config: toml::Value =
			toml::from_str("url = \"https://api.hyperliquid-testnet.xyz\"").unwrap();
		assert!(create_dispatcher(&config).is_ok());

		let config: toml::Value = toml::from_str("timeout_seconds = 5").unwrap();
		assert!(matches!(
			create_dispatcher(&config),
			Err(DeliveryError::Configuration(_))
		));

		let config: toml::Value =
			toml::from_str("url = \"ftp://x\"\ntimeout_seconds = 5").unwrap();
		assert!(create_dispatcher(&config).is_err());

		let config: toml::Value =
			toml::from_str("url = \"http://localhost\"\ntimeout_seconds = 0").unwrap();
		assert!(create_dispatcher(&config).is_err());
	}

	#[test]
	fn test_trailing_slash_is_trimmed() {
		let dispatcher =
			HttpDispatcher::new("https://api.hyperliquid.xyz/", Duration::from_secs(1)).unwrap();
		assert_eq!(dispatcher.base_url, "https://api.hyperliquid.xyz");
	}

	#[tokio::test]
	async fn test_unreachable_host_is_a_network_error() {
		// Port 9 on localhost (discard) is closed in test environments.
		let dispatcher = HttpDispatcher::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
		let err = dispatcher
			.info(&InfoRequest::SpotDeployState {
				user: "0x0000000000000000000000000000000000000000".to_string(),
			})
			.await
			.unwrap_err();
		assert!(matches!(err, DeliveryError::Network(_)), "got {:?}", err);
	}
}
