//! Request and response shapes of the exchange HTTP API.

use crate::account::Signature;
use crate::action::Action;
use serde::{Deserialize, Serialize};

/// Body of `POST {base}/exchange`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
	pub action: Action,
	pub nonce: u64,
	pub signature: Signature,
	/// Serialized as `null` when the account trades for itself.
	#[serde(rename = "vaultAddress")]
	pub vault_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
	Ok,
	Err,
}

/// Body returned by `POST {base}/exchange`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeResponse {
	pub status: ResponseStatus,
	#[serde(default)]
	pub response: serde_json::Value,
}

impl ExchangeResponse {
	/// Interprets the response envelope.
	///
	/// On `ok` the step identifier, if any, sits in `response.data`. On `err`
	/// the `response` is the rejection reason, usually a plain string.
	pub fn into_outcome(self) -> DispatchOutcome {
		match self.status {
			ResponseStatus::Ok => DispatchOutcome::Accepted {
				data: self.response.get("data").cloned(),
			},
			ResponseStatus::Err => {
				let reason = match self.response {
					serde_json::Value::String(reason) => reason,
					other => other.to_string(),
				};
				DispatchOutcome::Rejected { reason }
			},
		}
	}
}

/// The exchange's verdict on one signed action.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
	Accepted { data: Option<serde_json::Value> },
	Rejected { reason: String },
}

impl DispatchOutcome {
	/// Integer identifier carried by an accepted response (token or spot index).
	pub fn identifier(&self) -> Option<u32> {
		match self {
			DispatchOutcome::Accepted { data: Some(data) } => {
				data.as_u64().and_then(|v| u32::try_from(v).ok())
			},
			_ => None,
		}
	}
}

/// Body of `POST {base}/info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InfoRequest {
	/// In-progress spot deployments of a user.
	SpotDeployState { user: String },
}

/// Response to [`InfoRequest::SpotDeployState`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDeployState {
	#[serde(default)]
	pub states: Vec<RemoteTokenDeployState>,
}

impl RemoteDeployState {
	pub fn find_by_name(&self, name: &str) -> Option<&RemoteTokenDeployState> {
		self.states.iter().find(|s| s.spec.name == name)
	}

	pub fn find_by_token(&self, token: u32) -> Option<&RemoteTokenDeployState> {
		self.states.iter().find(|s| s.token == token)
	}
}

/// Exchange-side progress of one token deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTokenDeployState {
	pub token: u32,
	pub spec: RemoteTokenSpec,
	#[serde(default)]
	pub full_name: Option<String>,
	#[serde(default)]
	pub spots: Vec<u32>,
	#[serde(default)]
	pub max_supply: Option<String>,
	#[serde(default)]
	pub user_genesis_balances: Vec<(String, String)>,
	#[serde(default)]
	pub existing_token_genesis_balances: Vec<(u32, String)>,
}

impl RemoteTokenDeployState {
	/// Whether `address` was allocated exactly `wei` at genesis.
	pub fn has_user_balance(&self, address: &str, wei: &str) -> bool {
		self.user_genesis_balances
			.iter()
			.any(|(a, w)| a.eq_ignore_ascii_case(address) && w == wei)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTokenSpec {
	pub name: String,
	pub sz_decimals: u8,
	pub wei_decimals: u8,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_ok_response_carries_identifier() {
		let response: ExchangeResponse = serde_json::from_value(json!({
			"status": "ok",
			"response": {"type": "default", "data": 1562}
		}))
		.unwrap();
		let outcome = response.into_outcome();
		assert_eq!(outcome.identifier(), Some(1562));
	}

	#[test]
	fn test_ok_response_without_data() {
		let response: ExchangeResponse = serde_json::from_value(json!({
			"status": "ok",
			"response": {"type": "default"}
		}))
		.unwrap();
		assert_eq!(
			response.into_outcome(),
			DispatchOutcome::Accepted { data: None }
		);
	}

	#[test]
	fn test_err_response_reason_is_verbatim() {
		let response: ExchangeResponse = serde_json::from_value(json!({
			"status": "err",
			"response": "Genesis already called"
		}))
		.unwrap();
		assert_eq!(
			response.into_outcome(),
			DispatchOutcome::Rejected {
				reason: "Genesis already called".to_string()
			}
		);
	}

	#[test]
	fn test_info_request_shape() {
		let req = InfoRequest::SpotDeployState {
			user: "0x36279bea31b1cc48dd4454a2c7149f331ef3f3c3".to_string(),
		};
		assert_eq!(
			serde_json::to_value(req).unwrap(),
			json!({"type": "spotDeployState", "user": "0x36279bea31b1cc48dd4454a2c7149f331ef3f3c3"})
		);
	}

	#[test]
	fn test_remote_state_tolerates_extra_fields() {
		let state: RemoteDeployState = serde_json::from_value(json!({
			"states": [{
				"token": 1562,
				"spec": {"name": "TEST0", "szDecimals": 2, "weiDecimals": 8},
				"fullName": "Test token example",
				"spots": [1436],
				"maxSupply": "100000000900000000",
				"hyperliquidityGenesisBalance": "0",
				"totalGenesisBalanceWei": "100000000900000000",
				"userGenesisBalances": [["0x36279bea31b1cc48dd4454a2c7149f331ef3f3c3", "100000000900000000"]],
				"existingTokenGenesisBalances": []
			}],
			"gasAuction": {"startTimeSeconds": 0}
		}))
		.unwrap();
		let token = state.find_by_name("TEST0").unwrap();
		assert_eq!(token.token, 1562);
		assert_eq!(token.spots, vec![1436]);
		assert!(token.has_user_balance(
			"0x36279BeA31b1CC48dd4454a2C7149f331eF3f3c3",
			"100000000900000000"
		));
		assert!(state.find_by_token(1).is_none());
	}
}
