//! End-to-end runs of the standard lending market plan against the simulated
//! network.
//!
//! Run with: cargo test --test orchestrator_test

use alloy_core::primitives::Address;
use alloy_sol_types::SolCall;
use poolforge_deploy::{
    Arg, CallSpec, DeployError, DeploySpec, DeploymentKind, DeploymentReport, DeploymentStatus,
    MarketConfig, OrchestrationFailure, Orchestrator, Plan, ProxySettings, RoleAssignment,
    SimulatedNetwork, SmokeTestSpec, Stage,
    abi::ether,
    contracts::{IMiddleFeeDistribution, IMultiFeeDistribution, IPriceOracle, ITokensHelper},
    lending_market,
};

/// Initialize tracing for tests (idempotent).
fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();
}

fn standard_plan() -> Plan {
    lending_market(&MarketConfig::default(), &SmokeTestSpec::default())
}

fn orchestrator(network: SimulatedNetwork, plan: &Plan) -> Orchestrator<SimulatedNetwork> {
    init_test_tracing();
    let proxy = ProxySettings::default();
    let artifacts = plan.placeholder_artifacts(&proxy);
    Orchestrator::new(network, artifacts, proxy)
}

async fn run_failing(
    network: SimulatedNetwork,
) -> (Orchestrator<SimulatedNetwork>, OrchestrationFailure) {
    let plan = standard_plan();
    let orchestrator = orchestrator(network, &plan);
    let Err(failure) = orchestrator.run(&plan).await else {
        panic!("deployment should have halted");
    };
    (orchestrator, failure)
}

#[tokio::test]
async fn test_standard_market_deploys_end_to_end() {
    let plan = standard_plan();
    let orchestrator = orchestrator(SimulatedNetwork::new(), &plan);
    let outcome = orchestrator
        .run(&plan)
        .await
        .expect("deployment should succeed");

    let registry = &outcome.registry;
    let network = orchestrator.network();
    let deployer = outcome.accounts.deployer;

    // Registration order follows plan order and every address is set.
    let planned: Vec<String> = plan.iter().flat_map(|step| step.step.registers()).collect();
    let registered: Vec<&str> = registry.names().collect();
    assert_eq!(registered, planned);
    assert!(registry.records().iter().all(|record| !record.address.is_zero()));
    let owner_of = |name: &str| {
        let address = registry.address(name).unwrap();
        async move { network.owner_of(address).await }
    };

    let protocol_admin = registry.address("MockProtocolAdmin").unwrap();
    let configurator = registry.address("LendingPoolConfigurator").unwrap();
    assert_eq!(owner_of("AaveOracle").await, Some(protocol_admin));
    assert_eq!(owner_of("StableAndVariableTokensHelper").await, Some(protocol_admin));
    assert_eq!(owner_of("MiddleFeeDistribution").await, Some(configurator));
    assert_eq!(owner_of("LendingRateOracle").await, Some(deployer));

    let middle_minters = network
        .minters_of(registry.address("MiddleFeeDistribution").unwrap())
        .await
        .unwrap();
    assert_eq!(
        middle_minters,
        vec![
            registry.address("ChefIncentivesController").unwrap(),
            registry.address("MerkleDistributor").unwrap(),
        ]
    );

    let smoke = outcome.smoke_test.expect("smoke test should have run");
    assert_eq!(smoke.reserve_after - smoke.reserve_before, ether(2000));
    assert_eq!(smoke.deposited, ether(2000));
    assert_eq!(smoke.flash_loan_after, smoke.flash_loan_before);

    for record in registry.records() {
        if let DeploymentKind::ProxyInstance { implementation, .. } = &record.kind {
            assert_eq!(
                network.implementation_of(record.address).await,
                Some(*implementation)
            );
        }
    }

    let transactions = network.transactions().await;
    assert!(transactions.iter().all(|tx| tx.reverted.is_none()));
    assert!(transactions.iter().all(|tx| tx.from == deployer));
}

#[tokio::test]
async fn test_failed_configuration_call_halts_in_place() {
    let network =
        SimulatedNetwork::new().failing_call(IMultiFeeDistribution::setMintersCall::SIGNATURE);
    let (orchestrator, failure) = run_failing(network).await;

    assert_eq!(failure.stage, Stage::OraclesWiredAndOwned);
    assert!(matches!(
        &failure.source,
        DeployError::ConfigurationCall { target, .. } if target == "LPFeeDistribution"
    ));
    let step = failure.step.as_ref().unwrap();
    assert!(step.label.contains("minters"));
    let error = failure.source.chain();
    assert!(error.contains("LPFeeDistribution"), "{error}");
    assert!(error.contains("simulated failure"), "{error}");

    // The handoff that follows never ran.
    let middle = failure.registry.address("MiddleFeeDistribution").unwrap();
    let transactions = orchestrator.network().transactions().await;
    let deployer = transactions[0].from;
    assert_eq!(orchestrator.network().owner_of(middle).await, Some(deployer));
    assert!(!failure.registry.contains("DefaultReserveInterestRateStrategy"));
}

#[tokio::test]
async fn test_failed_initializer_leaves_orphaned_implementation() {
    let network =
        SimulatedNetwork::new().failing_call(IMiddleFeeDistribution::initializeCall::SIGNATURE);
    let (_, failure) = run_failing(network).await;

    assert_eq!(failure.stage, Stage::OraclesWiredAndOwned);
    assert!(matches!(
        &failure.source,
        DeployError::Initialization { name, .. } if name == "MiddleFeeDistribution"
    ));
    assert!(failure.registry.contains("MiddleFeeDistribution_Implementation"));
    assert!(!failure.registry.contains("MiddleFeeDistribution"));
    assert!(failure.registry.contains("MultiFeeDistribution"));
}

#[tokio::test]
async fn test_rejected_deployment_reports_reached_stage() {
    let network = SimulatedNetwork::new().failing_deploy("AaveOracle");
    let (_, failure) = run_failing(network).await;

    assert_eq!(failure.stage, Stage::TokenizationImplsDeployed);
    assert!(matches!(
        &failure.source,
        DeployError::DeploymentRejected { name, .. } if name == "AaveOracle"
    ));
    assert!(failure.registry.contains("VariableDebtToken"));
    assert!(!failure.registry.contains("AaveOracle"));

    let report = DeploymentReport::halted("fingerprint".into(), "simulated", &failure);
    let DeploymentStatus::Halted { stage, error, .. } = &report.status else {
        panic!("report should be halted");
    };
    assert_eq!(*stage, Stage::TokenizationImplsDeployed);
    assert!(error.starts_with("deployment of `AaveOracle` was rejected: "), "{error}");
    assert!(error.contains("simulated failure"), "{error}");
    assert_eq!(report.deployments.len(), failure.registry.len());
}

#[tokio::test]
async fn test_borrowed_oracle_is_returned_when_its_batch_fails() {
    let network =
        SimulatedNetwork::new().failing_call(ITokensHelper::setOracleBorrowRatesCall::SIGNATURE);
    let (orchestrator, failure) = run_failing(network).await;

    assert_eq!(failure.stage, Stage::TokenizationImplsDeployed);
    assert!(matches!(
        &failure.source,
        DeployError::ConfigurationCall { method, .. } if method.starts_with("setOracleBorrowRates")
    ));

    let transactions = orchestrator.network().transactions().await;
    let deployer = transactions[0].from;
    let oracle = failure.registry.address("LendingRateOracle").unwrap();
    assert_eq!(orchestrator.network().owner_of(oracle).await, Some(deployer));
}

#[tokio::test]
async fn test_privileged_call_after_handoff_sends_nothing() {
    let plan = Plan::builder()
        .stage(Stage::RegistriesDeployed)
        .deploy(DeploySpec::new("AaveOracle").args(vec![
            Arg::empty_array(),
            Arg::empty_array(),
            Arg::Address(Address::ZERO),
            Arg::Address(Address::ZERO),
            Arg::u64(100_000_000),
        ]))
        .hand_off(RoleAssignment::owner("AaveOracle", Arg::Treasury))
        .configure(CallSpec::of::<IPriceOracle::setAssetSourcesCall>(
            "AaveOracle",
            vec![Arg::empty_array(), Arg::empty_array()],
        ))
        .build();

    let orchestrator = orchestrator(SimulatedNetwork::new(), &plan);
    let Err(failure) = orchestrator.run(&plan).await else {
        panic!("plan should be rejected");
    };

    assert_eq!(failure.stage, Stage::Init);
    assert!(failure.step.is_none());
    assert!(failure.accounts.is_none());
    assert!(matches!(failure.source, DeployError::PlanOrder { index: 2, .. }));
    assert!(failure.registry.is_empty());
    assert!(orchestrator.network().transactions().await.is_empty());
}

#[tokio::test]
async fn test_explicit_accounts_are_used() {
    let plan = standard_plan();
    let deployer = Address::with_last_byte(3);
    let treasury = Address::with_last_byte(4);
    let orchestrator =
        orchestrator(SimulatedNetwork::new(), &plan).with_accounts(Some(deployer), Some(treasury));

    let outcome = orchestrator.run(&plan).await.unwrap();
    assert_eq!(outcome.accounts.deployer, deployer);
    assert_eq!(outcome.accounts.treasury, treasury);
    assert!(
        orchestrator
            .network()
            .transactions()
            .await
            .iter()
            .all(|tx| tx.from == deployer)
    );
}
