//! End-to-end runs of the deploy pipeline against a scripted exchange.

use deployer_account::implementations::local::LocalWallet;
use deployer_account::AccountService;
use deployer_config::DeploymentPlan;
use deployer_core::pipeline::PipelineContext;
use deployer_core::{
	ActionBuilder, ActionSubmitter, DeployPipeline, NonceClock, OperatorVerdict, PipelineError,
	RejectionClassifier,
};
use deployer_delivery::implementations::mock::MockDispatcher;
use deployer_delivery::{DeliveryError, DeliveryService, RetryPolicy};
use deployer_storage::implementations::file::FileStorage;
use deployer_storage::implementations::memory::MemoryStorage;
use deployer_storage::StorageService;
use deployer_types::{
	Action, ActionKind, Chain, DeployKey, DeployStage, DeployState, DeployStep, Network, SecretKey,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

fn test0_plan(n_orders: u32) -> DeploymentPlan {
	toml::from_str(&format!(
		r#"
sz_decimals = 2
wei_decimals = 8
max_gas = 1000000000000
full_name = "Test token example"
max_supply = "100000000900000000"

[[user_genesis]]
address = "0x36279bea31b1cc48dd4454a2c7149f331ef3f3c3"
wei = "100000000000000000"

[[user_genesis]]
address = "0x0000000000000000000000000000000000000001"
wei = "900000000"

[hyperliquidity]
start_px = "2.0"
order_sz = "4.0"
n_orders = {}
"#,
		n_orders
	))
	.unwrap()
}

fn submitter(mock: &MockDispatcher) -> Arc<ActionSubmitter> {
	let wallet = LocalWallet::new(&SecretKey::from(KEY)).unwrap();
	Arc::new(ActionSubmitter::new(
		Arc::new(AccountService::new(Box::new(wallet))),
		Arc::new(DeliveryService::new(
			Box::new(mock.clone()),
			RetryPolicy::immediate(),
		)),
		Arc::new(NonceClock::new().unwrap()),
		None,
	))
}

async fn open(
	mock: &MockDispatcher,
	storage: Arc<StorageService>,
	plan: DeploymentPlan,
) -> Result<DeployPipeline, PipelineError> {
	let context = PipelineContext {
		actions: ActionBuilder::new(Network::Testnet),
		submitter: submitter(mock),
		storage,
		classifier: RejectionClassifier::new(["already", "duplicate", "has been registered"]),
	};
	let (_tx, rx) = watch::channel(false);
	DeployPipeline::open(
		DeployKey::new(Chain::HypercoreTestnet, "TEST0"),
		plan,
		context,
		rx,
	)
	.await
}

fn memory() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

#[tokio::test]
async fn test_full_deploy_without_hyperliquidity_orders() {
	let mock = MockDispatcher::new();
	mock.push_ok(Some(1562));
	mock.push_ok(None);
	mock.push_ok(None);
	mock.push_ok(Some(1436));
	mock.push_ok(None);

	let mut plan = test0_plan(0);
	plan.no_hyperliquidity = true;
	let mut pipeline = open(&mock, memory(), plan).await.unwrap();
	let state = pipeline.run().await.unwrap();

	assert_eq!(
		state,
		DeployState::HyperliquidityRegistered {
			token_index: 1562,
			spot_index: 1436
		}
	);
	let kinds: Vec<ActionKind> = mock
		.exchange_requests()
		.iter()
		.map(|r| r.action.kind())
		.collect();
	assert_eq!(
		kinds,
		vec![
			ActionKind::RegisterToken,
			ActionKind::UserGenesis,
			ActionKind::Genesis,
			ActionKind::RegisterSpot,
			ActionKind::RegisterHyperliquidity,
		]
	);

	let requests = mock.exchange_requests();
	let Action::SpotDeployGenesis(genesis) = &requests[2].action else {
		panic!("expected genesis, got {:?}", requests[2].action.kind());
	};
	assert!(genesis.no_hyperliquidity);
	assert_eq!(genesis.max_supply, "100000000900000000");

	// Nonces are strictly increasing across the run.
	let nonces: Vec<u64> = requests.iter().map(|r| r.nonce).collect();
	assert!(nonces.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_single_holder_receives_whole_supply() {
	let mock = MockDispatcher::new();
	mock.push_ok(Some(1562));
	mock.push_ok(None);
	mock.push_ok(None);
	mock.push_ok(Some(1436));
	mock.push_ok(None);

	let mut plan = test0_plan(0);
	plan.no_hyperliquidity = true;
	plan.user_genesis.truncate(1);
	plan.user_genesis[0].wei = "100000000900000000".to_string();
	let mut pipeline = open(&mock, memory(), plan).await.unwrap();

	assert_eq!(
		pipeline.run().await.unwrap(),
		DeployState::HyperliquidityRegistered {
			token_index: 1562,
			spot_index: 1436
		}
	);
	let requests = mock.exchange_requests();
	let Action::SpotDeployUserGenesis(allocation) = &requests[1].action else {
		panic!("expected user genesis, got {:?}", requests[1].action.kind());
	};
	assert_eq!(
		allocation.user_and_wei,
		vec![(
			"0x36279bea31b1cc48dd4454a2c7149f331ef3f3c3".to_string(),
			"100000000900000000".to_string()
		)]
	);
	let Action::SpotDeployGenesis(genesis) = &requests[2].action else {
		panic!("expected genesis, got {:?}", requests[2].action.kind());
	};
	assert!(genesis.no_hyperliquidity);
	let Action::SpotDeployRegisterHyperliquidity(hyperliquidity) = &requests[4].action else {
		panic!("expected hyperliquidity, got {:?}", requests[4].action.kind());
	};
	assert_eq!(hyperliquidity.n_orders, 0);
	assert_eq!(hyperliquidity.spot, 1436);
}

#[tokio::test]
async fn test_orders_with_hyperliquidity_disabled_stop_at_spot() {
	let mock = MockDispatcher::new();
	mock.push_ok(Some(1562));
	mock.push_ok(None);
	mock.push_ok(None);
	mock.push_ok(Some(1436));

	let mut plan = test0_plan(5);
	plan.no_hyperliquidity = true;
	let mut pipeline = open(&mock, memory(), plan).await.unwrap();
	let failure = pipeline.run().await.unwrap_err();

	assert_eq!(failure.furthest_state, DeployStage::SpotRegistered);
	assert!(matches!(failure.error, PipelineError::InvariantViolation(_)));
	assert_eq!(mock.exchange_requests().len(), 4);
}

#[tokio::test]
async fn test_rerun_after_completion_sends_nothing() {
	let mock = MockDispatcher::new();
	let storage = memory();
	for data in [Some(1562), None, None, Some(1436), None] {
		mock.push_ok(data);
	}
	let mut pipeline = open(&mock, storage.clone(), test0_plan(0)).await.unwrap();
	pipeline.run().await.unwrap();
	drop(pipeline);

	let mut pipeline = open(&mock, storage, test0_plan(0)).await.unwrap();
	assert!(pipeline.run().await.is_ok());
	assert_eq!(mock.exchange_requests().len(), 5);
}

#[tokio::test]
async fn test_uncertain_step_is_reconciled_on_resume() {
	let dir = tempfile::tempdir().unwrap();
	let storage = || {
		Arc::new(StorageService::new(Box::new(FileStorage::new(
			dir.path().to_path_buf(),
		))))
	};
	let mock = MockDispatcher::new();
	mock.push_ok(Some(1562));
	mock.push_exchange(Err(DeliveryError::Uncertain("read timed out".into())));

	let mut pipeline = open(&mock, storage(), test0_plan(0)).await.unwrap();
	let failure = pipeline.run().await.unwrap_err();
	assert!(failure.error.is_uncertain());
	assert_eq!(failure.furthest_state, DeployStage::TokenRegistered);
	drop(pipeline);

	// The exchange shows both genesis balances, so the step landed.
	mock.push_info(Ok(json!({
		"states": [{
			"token": 1562,
			"spec": {"name": "TEST0", "szDecimals": 2, "weiDecimals": 8},
			"spots": [],
			"userGenesisBalances": [
				["0x36279bea31b1cc48dd4454a2c7149f331ef3f3c3", "100000000000000000"],
				["0x0000000000000000000000000000000000000001", "900000000"]
			],
			"existingTokenGenesisBalances": []
		}]
	})));
	mock.push_ok(None);
	mock.push_ok(Some(1436));
	mock.push_ok(None);

	let mut pipeline = open(&mock, storage(), test0_plan(0)).await.unwrap();
	assert_eq!(pipeline.record().pending.as_ref().map(|p| p.step), Some(DeployStep::UserGenesis));
	let state = pipeline.run().await.unwrap();
	assert_eq!(
		state,
		DeployState::HyperliquidityRegistered {
			token_index: 1562,
			spot_index: 1436
		}
	);
	// User genesis was not sent a second time.
	assert_eq!(mock.exchange_requests().len(), 5);
}

#[tokio::test]
async fn test_operator_settles_what_reconciliation_cannot() {
	let mock = MockDispatcher::new();
	let storage = memory();
	for data in [Some(1562), None, None] {
		mock.push_ok(data);
	}
	mock.push_exchange(Err(DeliveryError::Uncertain("connection closed".into())));

	let mut pipeline = open(&mock, storage.clone(), test0_plan(0)).await.unwrap();
	assert!(pipeline.run().await.unwrap_err().error.is_uncertain());
	drop(pipeline);

	// The token has left the in-progress list: remote state cannot decide.
	mock.push_info(Ok(json!({"states": []})));
	let mut pipeline = open(&mock, storage.clone(), test0_plan(0)).await.unwrap();
	let failure = pipeline.run().await.unwrap_err();
	assert!(matches!(failure.error, PipelineError::UncertainOutcome { .. }));

	let err = pipeline
		.confirm(OperatorVerdict {
			landed: true,
			identifier: None,
		})
		.await
		.unwrap_err();
	assert!(matches!(err, PipelineError::Validation(_)));

	let state = pipeline
		.confirm(OperatorVerdict {
			landed: true,
			identifier: Some(1436),
		})
		.await
		.unwrap();
	assert_eq!(
		state,
		DeployState::SpotRegistered {
			token_index: 1562,
			spot_index: 1436
		}
	);

	mock.push_ok(None);
	assert!(pipeline.run().await.is_ok());
	assert_eq!(mock.exchange_requests().len(), 5);
}

#[tokio::test]
async fn test_not_landed_verdict_resends_the_step() {
	let mock = MockDispatcher::new();
	mock.push_ok(Some(1562));
	mock.push_exchange(Err(DeliveryError::Uncertain("connection closed".into())));

	let mut pipeline = open(&mock, memory(), test0_plan(0)).await.unwrap();
	assert!(pipeline.run().await.unwrap_err().error.is_uncertain());

	let state = pipeline
		.confirm(OperatorVerdict {
			landed: false,
			identifier: None,
		})
		.await
		.unwrap();
	assert_eq!(state, DeployState::TokenRegistered { token_index: 1562 });

	for data in [None, None, Some(1436), None] {
		mock.push_ok(data);
	}
	assert!(pipeline.run().await.is_ok());
	let requests = mock.exchange_requests();
	assert_eq!(requests.len(), 6);
	assert!(matches!(requests[2].action, Action::SpotDeployUserGenesis(_)));
	assert_ne!(requests[1].nonce, requests[2].nonce);
}

#[tokio::test]
async fn test_unreachable_exchange_is_not_uncertain() {
	let mock = MockDispatcher::new();
	for _ in 0..200 {
		mock.push_exchange(Err(DeliveryError::Network("connection refused".into())));
	}
	let mut pipeline = open(&mock, memory(), test0_plan(0)).await.unwrap();
	let failure = pipeline.run().await.unwrap_err();
	assert!(matches!(failure.error, PipelineError::TransientNetwork(_)));
	assert!(pipeline.record().pending.is_none());
}
