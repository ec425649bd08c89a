//! Exchange actions and their signing schemas.
//!
//! Every action is a user-signed action: it carries the signing-domain chain id
//! (`signatureChainId`) and the network tag (`hyperliquidChain`) next to its own
//! fields, and it is authorized by an EIP-712 signature over a per-variant
//! ordered field schema. Each variant is a separate struct that rejects unknown
//! fields, so a stray or missing field can never reach the signer.

use crate::chain::Network;
use crate::nonce::Nonce;
use crate::typed_data::{Eip712Value, FieldSpec, SigningDomain, TypedData, TypedMessage};
use alloy_primitives::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Chain id of the signing domain, rendered on the wire as a hex string such as
/// `"0x66eee"`.
///
/// Unrelated to any destination chain id carried inside an action body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureChainId(pub u64);

impl SignatureChainId {
	pub fn for_network(network: Network) -> Self {
		Self(network.default_signature_chain_id())
	}

	pub fn as_u64(&self) -> u64 {
		self.0
	}
}

impl fmt::Display for SignatureChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{:x}", self.0)
	}
}

impl Serialize for SignatureChainId {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for SignatureChainId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		let digits = s
			.strip_prefix("0x")
			.ok_or_else(|| serde::de::Error::custom("signatureChainId must start with 0x"))?;
		u64::from_str_radix(digits, 16)
			.map(SignatureChainId)
			.map_err(|e| serde::de::Error::custom(format!("invalid signatureChainId: {}", e)))
	}
}

/// Spot token transfer on the native ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpotSend {
	pub signature_chain_id: SignatureChainId,
	pub hyperliquid_chain: String,
	pub destination: String,
	pub token: String,
	pub amount: String,
	pub time: u64,
}

/// Transfer from the native ledger to an EVM contract with a data payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendToEvmWithData {
	pub signature_chain_id: SignatureChainId,
	pub hyperliquid_chain: String,
	pub token: String,
	pub amount: String,
	pub source_dex: String,
	pub destination_recipient: String,
	pub address_encoding: String,
	pub destination_chain_id: u32,
	pub gas_limit: u64,
	pub data: Bytes,
	pub nonce: u64,
}

/// Deploy step 1: register a token name and its decimals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpotDeployRegisterToken {
	pub signature_chain_id: SignatureChainId,
	pub hyperliquid_chain: String,
	pub name: String,
	pub sz_decimals: u8,
	pub wei_decimals: u8,
	pub max_gas: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub full_name: Option<String>,
	pub nonce: u64,
}

/// Deploy step 2: allocate genesis balances. Repeatable until genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpotDeployUserGenesis {
	pub signature_chain_id: SignatureChainId,
	pub hyperliquid_chain: String,
	pub token: u32,
	/// `[address, wei]` pairs.
	pub user_and_wei: Vec<(String, String)>,
	/// `[token index, wei]` pairs for holders of an existing token.
	pub existing_token_and_wei: Vec<(u32, String)>,
	pub nonce: u64,
}

/// Deploy step 3: finalize the max supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpotDeployGenesis {
	pub signature_chain_id: SignatureChainId,
	pub hyperliquid_chain: String,
	pub token: u32,
	pub max_supply: String,
	pub no_hyperliquidity: bool,
	pub nonce: u64,
}

/// Deploy step 4: register the `[base, quote]` spot pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpotDeployRegisterSpot {
	pub signature_chain_id: SignatureChainId,
	pub hyperliquid_chain: String,
	pub tokens: [u32; 2],
	pub nonce: u64,
}

/// Deploy step 5: register hyperliquidity for the spot pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpotDeployRegisterHyperliquidity {
	pub signature_chain_id: SignatureChainId,
	pub hyperliquid_chain: String,
	pub spot: u32,
	pub start_px: String,
	pub order_sz: String,
	pub n_orders: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub n_seeded_levels: Option<u32>,
	pub nonce: u64,
}

/// Requests that a registered token be linked to an EVM contract.
///
/// Travels as a `spotDeploy` action with the link parameters nested under
/// `requestEvmContract`; the signed schema keeps them flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RequestEvmContractWire", from = "RequestEvmContractWire")]
pub struct SpotDeployRequestEvmContract {
	pub signature_chain_id: SignatureChainId,
	pub hyperliquid_chain: String,
	pub token: u32,
	/// Lowercase `0x` contract address.
	pub address: String,
	pub evm_extra_wei_decimals: u8,
	pub nonce: u64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RequestEvmContractWire {
	signature_chain_id: SignatureChainId,
	hyperliquid_chain: String,
	request_evm_contract: RequestEvmContractBody,
	nonce: u64,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RequestEvmContractBody {
	token: u32,
	address: String,
	evm_extra_wei_decimals: u8,
}

impl From<SpotDeployRequestEvmContract> for RequestEvmContractWire {
	fn from(a: SpotDeployRequestEvmContract) -> Self {
		Self {
			signature_chain_id: a.signature_chain_id,
			hyperliquid_chain: a.hyperliquid_chain,
			request_evm_contract: RequestEvmContractBody {
				token: a.token,
				address: a.address,
				evm_extra_wei_decimals: a.evm_extra_wei_decimals,
			},
			nonce: a.nonce,
		}
	}
}

impl From<RequestEvmContractWire> for SpotDeployRequestEvmContract {
	fn from(w: RequestEvmContractWire) -> Self {
		Self {
			signature_chain_id: w.signature_chain_id,
			hyperliquid_chain: w.hyperliquid_chain,
			token: w.request_evm_contract.token,
			address: w.request_evm_contract.address,
			evm_extra_wei_decimals: w.request_evm_contract.evm_extra_wei_decimals,
			nonce: w.nonce,
		}
	}
}

/// How the deployer proves ownership of the linked EVM contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FinalizeEvmContractInput {
	/// The deployer address is stored in the contract's first storage slot.
	FirstStorageSlot,
	/// The contract was created by the deployer with this account nonce.
	Create { nonce: u64 },
}

impl FinalizeEvmContractInput {
	fn tag(&self) -> &'static str {
		match self {
			FinalizeEvmContractInput::FirstStorageSlot => "firstStorageSlot",
			FinalizeEvmContractInput::Create { .. } => "create",
		}
	}
}

/// Confirms the EVM contract link requested earlier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpotDeployFinalizeEvmContract {
	pub signature_chain_id: SignatureChainId,
	pub hyperliquid_chain: String,
	pub token: u32,
	pub input: FinalizeEvmContractInput,
	pub nonce: u64,
}

/// A typed exchange action, tagged on the wire by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
	SpotSend(SpotSend),
	SendToEvmWithData(SendToEvmWithData),
	SpotDeployRegisterToken(SpotDeployRegisterToken),
	SpotDeployUserGenesis(SpotDeployUserGenesis),
	SpotDeployGenesis(SpotDeployGenesis),
	SpotDeployRegisterSpot(SpotDeployRegisterSpot),
	SpotDeployRegisterHyperliquidity(SpotDeployRegisterHyperliquidity),
	#[serde(rename = "spotDeploy")]
	SpotDeployRequestEvmContract(SpotDeployRequestEvmContract),
	#[serde(rename = "finalizeEvmContract")]
	SpotDeployFinalizeEvmContract(SpotDeployFinalizeEvmContract),
}

/// Discriminant of [`Action`], used in logs and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
	SpotSend,
	SendToEvmWithData,
	RegisterToken,
	UserGenesis,
	Genesis,
	RegisterSpot,
	RegisterHyperliquidity,
	RequestEvmContract,
	FinalizeEvmContract,
}

impl fmt::Display for ActionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ActionKind::SpotSend => "spot_send",
			ActionKind::SendToEvmWithData => "send_to_evm_with_data",
			ActionKind::RegisterToken => "register_token",
			ActionKind::UserGenesis => "user_genesis",
			ActionKind::Genesis => "genesis",
			ActionKind::RegisterSpot => "register_spot",
			ActionKind::RegisterHyperliquidity => "register_hyperliquidity",
			ActionKind::RequestEvmContract => "request_evm_contract",
			ActionKind::FinalizeEvmContract => "finalize_evm_contract",
		};
		f.write_str(name)
	}
}

/// Accumulates the ordered schema and the message values side by side so the
/// two can never drift apart.
struct MessageBuilder {
	schema: Vec<FieldSpec>,
	message: TypedMessage,
}

impl MessageBuilder {
	fn new(hyperliquid_chain: &str) -> Self {
		let mut builder = Self {
			schema: Vec::new(),
			message: TypedMessage::new(),
		};
		builder.field("hyperliquidChain", "string", hyperliquid_chain);
		builder
	}

	fn field(&mut self, name: &str, field_type: &str, value: impl Into<Eip712Value>) -> &mut Self {
		self.schema.push(FieldSpec::new(name, field_type));
		self.message.insert(name.to_string(), value.into());
		self
	}

	fn build(self, signature_chain_id: SignatureChainId, primary_type: &str) -> TypedData {
		TypedData {
			domain: SigningDomain::user_signed(signature_chain_id.as_u64()),
			primary_type: primary_type.to_string(),
			schema: self.schema,
			message: self.message,
		}
	}
}

/// Canonical `a:b,c:d` rendering of allocation lists for signing.
fn join_pairs<A: fmt::Display, B: fmt::Display>(pairs: &[(A, B)]) -> String {
	pairs
		.iter()
		.map(|(a, b)| format!("{}:{}", a, b))
		.collect::<Vec<_>>()
		.join(",")
}

impl Action {
	pub fn kind(&self) -> ActionKind {
		match self {
			Action::SpotSend(_) => ActionKind::SpotSend,
			Action::SendToEvmWithData(_) => ActionKind::SendToEvmWithData,
			Action::SpotDeployRegisterToken(_) => ActionKind::RegisterToken,
			Action::SpotDeployUserGenesis(_) => ActionKind::UserGenesis,
			Action::SpotDeployGenesis(_) => ActionKind::Genesis,
			Action::SpotDeployRegisterSpot(_) => ActionKind::RegisterSpot,
			Action::SpotDeployRegisterHyperliquidity(_) => ActionKind::RegisterHyperliquidity,
			Action::SpotDeployRequestEvmContract(_) => ActionKind::RequestEvmContract,
			Action::SpotDeployFinalizeEvmContract(_) => ActionKind::FinalizeEvmContract,
		}
	}

	/// EIP-712 primary type name of this action.
	pub fn primary_type(&self) -> &'static str {
		match self {
			Action::SpotSend(_) => "HyperliquidTransaction:SpotSend",
			Action::SendToEvmWithData(_) => "HyperliquidTransaction:SendToEvmWithData",
			Action::SpotDeployRegisterToken(_) => "HyperliquidTransaction:SpotDeployRegisterToken",
			Action::SpotDeployUserGenesis(_) => "HyperliquidTransaction:SpotDeployUserGenesis",
			Action::SpotDeployGenesis(_) => "HyperliquidTransaction:SpotDeployGenesis",
			Action::SpotDeployRegisterSpot(_) => "HyperliquidTransaction:SpotDeployRegisterSpot",
			Action::SpotDeployRegisterHyperliquidity(_) => {
				"HyperliquidTransaction:SpotDeployRegisterHyperliquidity"
			},
			Action::SpotDeployRequestEvmContract(_) => {
				"HyperliquidTransaction:SpotDeployRequestEvmContract"
			},
			Action::SpotDeployFinalizeEvmContract(_) => {
				"HyperliquidTransaction:SpotDeployFinalizeEvmContract"
			},
		}
	}

	pub fn signature_chain_id(&self) -> SignatureChainId {
		match self {
			Action::SpotSend(a) => a.signature_chain_id,
			Action::SendToEvmWithData(a) => a.signature_chain_id,
			Action::SpotDeployRegisterToken(a) => a.signature_chain_id,
			Action::SpotDeployUserGenesis(a) => a.signature_chain_id,
			Action::SpotDeployGenesis(a) => a.signature_chain_id,
			Action::SpotDeployRegisterSpot(a) => a.signature_chain_id,
			Action::SpotDeployRegisterHyperliquidity(a) => a.signature_chain_id,
			Action::SpotDeployRequestEvmContract(a) => a.signature_chain_id,
			Action::SpotDeployFinalizeEvmContract(a) => a.signature_chain_id,
		}
	}

	pub fn hyperliquid_chain(&self) -> &str {
		match self {
			Action::SpotSend(a) => &a.hyperliquid_chain,
			Action::SendToEvmWithData(a) => &a.hyperliquid_chain,
			Action::SpotDeployRegisterToken(a) => &a.hyperliquid_chain,
			Action::SpotDeployUserGenesis(a) => &a.hyperliquid_chain,
			Action::SpotDeployGenesis(a) => &a.hyperliquid_chain,
			Action::SpotDeployRegisterSpot(a) => &a.hyperliquid_chain,
			Action::SpotDeployRegisterHyperliquidity(a) => &a.hyperliquid_chain,
			Action::SpotDeployRequestEvmContract(a) => &a.hyperliquid_chain,
			Action::SpotDeployFinalizeEvmContract(a) => &a.hyperliquid_chain,
		}
	}

	/// The nonce carried inside the action body (`time` for spot sends).
	pub fn nonce(&self) -> Nonce {
		Nonce(*self.nonce_slot_ref())
	}

	/// Stamps the anti-replay nonce into the action body.
	pub fn stamp(&mut self, nonce: Nonce) {
		*self.nonce_slot() = nonce.0;
	}

	fn nonce_slot_ref(&self) -> &u64 {
		match self {
			Action::SpotSend(a) => &a.time,
			Action::SendToEvmWithData(a) => &a.nonce,
			Action::SpotDeployRegisterToken(a) => &a.nonce,
			Action::SpotDeployUserGenesis(a) => &a.nonce,
			Action::SpotDeployGenesis(a) => &a.nonce,
			Action::SpotDeployRegisterSpot(a) => &a.nonce,
			Action::SpotDeployRegisterHyperliquidity(a) => &a.nonce,
			Action::SpotDeployRequestEvmContract(a) => &a.nonce,
			Action::SpotDeployFinalizeEvmContract(a) => &a.nonce,
		}
	}

	fn nonce_slot(&mut self) -> &mut u64 {
		match self {
			Action::SpotSend(a) => &mut a.time,
			Action::SendToEvmWithData(a) => &mut a.nonce,
			Action::SpotDeployRegisterToken(a) => &mut a.nonce,
			Action::SpotDeployUserGenesis(a) => &mut a.nonce,
			Action::SpotDeployGenesis(a) => &mut a.nonce,
			Action::SpotDeployRegisterSpot(a) => &mut a.nonce,
			Action::SpotDeployRegisterHyperliquidity(a) => &mut a.nonce,
			Action::SpotDeployRequestEvmContract(a) => &mut a.nonce,
			Action::SpotDeployFinalizeEvmContract(a) => &mut a.nonce,
		}
	}

	/// Renders the action into the typed-data structure that gets signed.
	///
	/// Optional fields appear in both schema and message only when present.
	/// Booleans are signed as `uint8` and allocation lists as their canonical
	/// `a:b,c:d` string.
	pub fn typed_data(&self) -> TypedData {
		let mut m = MessageBuilder::new(self.hyperliquid_chain());
		match self {
			Action::SpotSend(a) => {
				m.field("destination", "string", a.destination.as_str())
					.field("token", "string", a.token.as_str())
					.field("amount", "string", a.amount.as_str())
					.field("time", "uint64", a.time);
			},
			Action::SendToEvmWithData(a) => {
				m.field("token", "string", a.token.as_str())
					.field("amount", "string", a.amount.as_str())
					.field("sourceDex", "string", a.source_dex.as_str())
					.field("destinationRecipient", "string", a.destination_recipient.as_str())
					.field("addressEncoding", "string", a.address_encoding.as_str())
					.field("destinationChainId", "uint32", a.destination_chain_id)
					.field("gasLimit", "uint64", a.gas_limit)
					.field("data", "bytes", a.data.clone())
					.field("nonce", "uint64", a.nonce);
			},
			Action::SpotDeployRegisterToken(a) => {
				m.field("name", "string", a.name.as_str())
					.field("szDecimals", "uint8", a.sz_decimals)
					.field("weiDecimals", "uint8", a.wei_decimals)
					.field("maxGas", "uint64", a.max_gas);
				if let Some(full_name) = &a.full_name {
					m.field("fullName", "string", full_name.as_str());
				}
				m.field("nonce", "uint64", a.nonce);
			},
			Action::SpotDeployUserGenesis(a) => {
				m.field("token", "uint32", a.token)
					.field("userAndWei", "string", join_pairs(&a.user_and_wei))
					.field("existingTokenAndWei", "string", join_pairs(&a.existing_token_and_wei))
					.field("nonce", "uint64", a.nonce);
			},
			Action::SpotDeployGenesis(a) => {
				m.field("token", "uint32", a.token)
					.field("maxSupply", "string", a.max_supply.as_str())
					.field("noHyperliquidity", "uint8", u8::from(a.no_hyperliquidity))
					.field("nonce", "uint64", a.nonce);
			},
			Action::SpotDeployRegisterSpot(a) => {
				m.field("baseToken", "uint32", a.tokens[0])
					.field("quoteToken", "uint32", a.tokens[1])
					.field("nonce", "uint64", a.nonce);
			},
			Action::SpotDeployRegisterHyperliquidity(a) => {
				m.field("spot", "uint32", a.spot)
					.field("startPx", "string", a.start_px.as_str())
					.field("orderSz", "string", a.order_sz.as_str())
					.field("nOrders", "uint32", a.n_orders);
				if let Some(levels) = a.n_seeded_levels {
					m.field("nSeededLevels", "uint32", levels);
				}
				m.field("nonce", "uint64", a.nonce);
			},
			Action::SpotDeployRequestEvmContract(a) => {
				m.field("token", "uint32", a.token)
					.field("address", "string", a.address.as_str())
					.field("evmExtraWeiDecimals", "uint8", a.evm_extra_wei_decimals)
					.field("nonce", "uint64", a.nonce);
			},
			Action::SpotDeployFinalizeEvmContract(a) => {
				m.field("token", "uint32", a.token)
					.field("input", "string", a.input.tag());
				if let FinalizeEvmContractInput::Create { nonce } = a.input {
					m.field("createNonce", "uint64", nonce);
				}
				m.field("nonce", "uint64", a.nonce);
			},
		}
		m.build(self.signature_chain_id(), self.primary_type())
	}
}
