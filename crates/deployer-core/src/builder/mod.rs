//! Builder for assembling a deployer from configuration.
//!
//! Storage, account and exchange transport are pluggable: each is created by a
//! named factory picked from the configured implementations.

use crate::actions::ActionBuilder;
use crate::classifier::RejectionClassifier;
use crate::nonce::NonceClock;
use crate::pipeline::{DeployPipeline, PipelineContext};
use crate::submit::ActionSubmitter;
use crate::PipelineError;
use alloy_primitives::Address;
use deployer_account::{AccountFactory, AccountService};
use deployer_config::Config;
use deployer_delivery::{DeliveryService, DispatchFactory, RetryPolicy};
use deployer_storage::{StorageFactory, StorageService};
use deployer_types::{DeployKey, DeployLogEntry, DeployRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Errors that can occur while assembling a deployer.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by
/// implementation name.
pub struct DeployerFactories {
	pub storage_factories: HashMap<String, StorageFactory>,
	pub account_factories: HashMap<String, AccountFactory>,
	pub dispatch_factories: HashMap<String, DispatchFactory>,
}

impl DeployerFactories {
	/// Every implementation shipped with the workspace.
	pub fn all() -> Self {
		Self {
			storage_factories: deployer_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			account_factories: deployer_account::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			dispatch_factories: deployer_delivery::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}
}

pub struct DeployerBuilder {
	config: Config,
}

impl DeployerBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Creates the primary implementation of each component.
	pub async fn build(self, factories: DeployerFactories) -> Result<Deployer, BuilderError> {
		let config = self.config;

		let storage_backend = create_primary(
			"storage",
			&config.storage.primary,
			&config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let account_backend = create_primary(
			"account",
			&config.account.primary,
			&config.account.implementations,
			&factories.account_factories,
		)?;
		let account = Arc::new(AccountService::new(account_backend));
		let address = account.get_address().await.map_err(|e| {
			tracing::error!(component = "account", error = %e, "Failed to get deployer address");
			BuilderError::Config(format!("Failed to get deployer address: {}", e))
		})?;

		let mut exchange_implementations = config.exchange.implementations.clone();
		let primary_exchange = exchange_implementations
			.entry(config.exchange.primary.clone())
			.or_insert_with(|| toml::Value::Table(toml::Table::new()));
		if let Some(table) = primary_exchange.as_table_mut() {
			if !table.contains_key("url") {
				table.insert(
					"url".to_string(),
					toml::Value::String(config.deployer.network.default_api_url().to_string()),
				);
			}
		}
		let dispatcher = create_primary(
			"exchange",
			&config.exchange.primary,
			&exchange_implementations,
			&factories.dispatch_factories,
		)?;
		let retry = RetryPolicy {
			initial_interval: Duration::from_millis(config.retry.initial_interval_ms),
			multiplier: config.retry.multiplier,
			max_interval: Duration::from_millis(config.retry.max_interval_ms),
			max_elapsed: Duration::from_millis(config.retry.max_elapsed_ms),
		};
		let delivery = Arc::new(DeliveryService::new(dispatcher, retry));

		let clock = Arc::new(
			NonceClock::new().map_err(|e| BuilderError::Config(e.to_string()))?,
		);
		let submitter = Arc::new(ActionSubmitter::new(
			account,
			delivery,
			clock,
			config.account.vault_address.clone(),
		));

		let actions = ActionBuilder::new(config.deployer.network)
			.with_signature_chain_id(config.deployer.signature_chain_id());
		let classifier = RejectionClassifier::new(&config.rejections.already_completed_patterns);

		tracing::info!(
			deployer = %config.deployer.id,
			network = %config.deployer.network,
			address = %address,
			"Deployer ready"
		);

		Ok(Deployer {
			config,
			actions,
			storage,
			submitter,
			classifier,
		})
	}
}

/// Looks up the factory of the primary implementation and runs it.
fn create_primary<T: ?Sized, E: std::fmt::Display>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, fn(&toml::Value) -> Result<Box<T>, E>>,
) -> Result<Box<T>, BuilderError> {
	let config = implementations.get(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!("{} implementation '{}'", component, primary))
	})?;
	let factory = factories.get(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Unknown {} implementation '{}'",
			component, primary
		))
	})?;
	match factory(config) {
		Ok(implementation) => {
			tracing::info!(component = %component, implementation = %primary, "Loaded");
			Ok(implementation)
		},
		Err(e) => {
			tracing::error!(
				component = %component,
				implementation = %primary,
				error = %e,
				"Failed to create implementation"
			);
			Err(BuilderError::Config(format!(
				"Failed to create {} implementation '{}': {}",
				component, primary, e
			)))
		},
	}
}

const SELF_CHECK_TOKEN: &str = "CHECK:0x00000000000000000000000000000000";

/// A configured deployer: shared services plus the deploy plans.
pub struct Deployer {
	config: Config,
	actions: ActionBuilder,
	storage: Arc<StorageService>,
	submitter: Arc<ActionSubmitter>,
	classifier: RejectionClassifier,
}

impl Deployer {
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn actions(&self) -> &ActionBuilder {
		&self.actions
	}

	pub fn submitter(&self) -> &Arc<ActionSubmitter> {
		&self.submitter
	}

	pub async fn address(&self) -> Result<Address, PipelineError> {
		self.submitter.address().await
	}

	/// Signs a zero-amount transfer to the signer itself and checks that the
	/// signature recovers to the signer. Nothing is sent.
	pub async fn self_check(&self) -> Result<Address, PipelineError> {
		let address = self.address().await?;
		let action = self
			.actions
			.spot_send(&address.to_string(), SELF_CHECK_TOKEN, "0")?;
		let request = self.submitter.sign(action).await?;
		let encoded = request.action.typed_data().encode()?;
		if !deployer_account::verify(&encoded, &request.signature, address) {
			return Err(PipelineError::Configuration(format!(
				"signature does not recover to {}",
				address
			)));
		}
		Ok(address)
	}

	/// Key of the deployment of `symbol` on the configured network.
	pub fn key(&self, symbol: &str) -> DeployKey {
		DeployKey::new(self.config.deployer.chain(), symbol)
	}

	/// Opens the pipeline of the configured deployment `symbol`.
	pub async fn open_pipeline(
		&self,
		symbol: &str,
		cancel: watch::Receiver<bool>,
	) -> Result<DeployPipeline, PipelineError> {
		let plan = self
			.config
			.deployment(symbol)
			.map_err(|e| PipelineError::Configuration(e.to_string()))?
			.clone();
		let context = PipelineContext {
			actions: self.actions,
			submitter: self.submitter.clone(),
			storage: self.storage.clone(),
			classifier: self.classifier.clone(),
		};
		DeployPipeline::open(self.key(symbol), plan, context, cancel).await
	}

	/// Stored record and log of `symbol`, without taking the lease.
	pub async fn status(
		&self,
		symbol: &str,
	) -> Result<Option<(DeployRecord, Vec<DeployLogEntry>)>, PipelineError> {
		let machine = crate::state::DeployStateMachine::new(self.storage.clone());
		let key = self.key(symbol);
		match machine.load(&key).await? {
			Some(record) => Ok(Some((record, machine.history(&key).await?))),
			None => Ok(None),
		}
	}
}
