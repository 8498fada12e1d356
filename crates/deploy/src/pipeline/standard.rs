//! The standard lending market: core protocol, oracles, reward chain, one
//! reserve, final ownership, smoke test.

use alloy_core::primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use super::{Plan, Stage};
use crate::{
    abi::{Arg, CallSpec, ether, ray_percent},
    contracts::{
        IAddressesProvider, IAddressesProviderRegistry, IChainlinkAggregator,
        IChefIncentivesController, ILendingPool, ILpToken, IMiddleFeeDistribution,
        IMultiFeeDistribution, IPriceOracle, IPriceProvider, ITokensHelper,
    },
    deployer::{AdoptSpec, DeploySpec, InitializerSpec, ProxySpec},
    ownership::OwnershipLoan,
    reserves::{ReserveBatch, ReserveInitSpec, ReserveTokenNames},
    roles::{RoleAssignment, RoleCheck, RoleKind},
    smoke::SmokeTestSpec,
};

const REGISTRY: &str = "LendingPoolAddressesProviderRegistry";
const PROVIDER: &str = "LendingPoolAddressesProvider";
const POOL: &str = "LendingPool";
const POOL_IMPL: &str = "LendingPoolImpl";
const CONFIGURATOR: &str = "LendingPoolConfigurator";
const CONFIGURATOR_IMPL: &str = "LendingPoolConfiguratorImpl";
const TOKENS_HELPER: &str = "StableAndVariableTokensHelper";
const PRICE_ORACLE: &str = "AaveOracle";
const RATE_ORACLE: &str = "LendingRateOracle";
const STAKING_TOKEN: &str = "MockStakingToken";
const AGGREGATOR: &str = "MockChainlinkAggregator";
const LP_TOKEN: &str = "MockLpContract";
const PRICE_PROVIDER: &str = "PriceProvider";
const STATS: &str = "MFDstats";
const LP_FEE_DISTRIBUTION: &str = "LPFeeDistribution";
const MULTI_FEE_DISTRIBUTION: &str = "MultiFeeDistribution";
const MIDDLE_FEE_DISTRIBUTION: &str = "MiddleFeeDistribution";
const ELIGIBLE_DATA_PROVIDER: &str = "RewardEligibleDataProvider";
const INCENTIVES_CONTROLLER: &str = "ChefIncentivesController";
const MERKLE_DISTRIBUTOR: &str = "MerkleDistributor";
const RATE_STRATEGY: &str = "DefaultReserveInterestRateStrategy";
const FLASH_LOAN: &str = "MockFlashLoan";
const PROTOCOL_ADMIN: &str = "MockProtocolAdmin";

/// Interest-rate curve of the reserve, in rays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestRateConfig {
    pub optimal_utilization_rate: U256,
    pub base_variable_borrow_rate: U256,
    pub variable_rate_slope1: U256,
    pub variable_rate_slope2: U256,
    pub stable_rate_slope1: U256,
    pub stable_rate_slope2: U256,
}

impl Default for InterestRateConfig {
    fn default() -> Self {
        Self {
            optimal_utilization_rate: ray_percent(90),
            base_variable_borrow_rate: U256::ZERO,
            variable_rate_slope1: ray_percent(4),
            variable_rate_slope2: ray_percent(60),
            stable_rate_slope1: ray_percent(2),
            stable_rate_slope2: ray_percent(60),
        }
    }
}

/// Parameters of the reward and fee-distribution contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Lookback of the LP price provider, in seconds.
    pub price_lookback: u64,
    pub rewards_duration: u64,
    pub rewards_lookback: u64,
    pub lock_duration: u64,
    pub rewards_per_second: U256,
    /// Tokens reserved for the merkle distributor.
    pub merkle_distributor_supply: U256,
    /// Reserves of the mock LP pair.
    pub lp_reserves: [U256; 2],
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            price_lookback: 1800,
            rewards_duration: 60,
            rewards_lookback: 30,
            lock_duration: 86_400,
            rewards_per_second: U256::from(1u64),
            merkle_distributor_supply: ether(200_000_000),
            lp_reserves: [ether(1_000_000), ether(300)],
        }
    }
}

/// The reserve listed on the new market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveConfig {
    pub underlying_supply: U256,
    pub decimals: u8,
    pub alloc_point: U256,
    pub token_name: String,
    pub token_symbol: String,
    pub params: Bytes,
    /// Initial answer of the mock price feed.
    pub price: i64,
}

impl Default for ReserveConfig {
    fn default() -> Self {
        Self {
            underlying_supply: ether(2000),
            decimals: 8,
            alloc_point: U256::from(100u64),
            token_name: "Shyft Aave interest bearing token".to_string(),
            token_symbol: "SAToken".to_string(),
            params: Bytes::from_static(&[0x10]),
            price: 100_000_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub market_id: String,
    pub provider_id: u64,
    /// Zero means the native currency (USD for this market).
    pub oracle_base_currency: Address,
    pub oracle_base_currency_unit: U256,
    #[serde(default)]
    pub interest_rate: InterestRateConfig,
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub reserve: ReserveConfig,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            market_id: "ShyftAave".to_string(),
            provider_id: 1,
            oracle_base_currency: Address::ZERO,
            oracle_base_currency_unit: U256::from(100_000_000u64),
            interest_rate: InterestRateConfig::default(),
            rewards: RewardsConfig::default(),
            reserve: ReserveConfig::default(),
        }
    }
}

/// The full deployment of a lending market with its reward chain.
pub fn lending_market(market: &MarketConfig, smoke_test: &SmokeTestSpec) -> Plan {
    let rewards = &market.rewards;
    let reserve = &market.reserve;
    let rates = &market.interest_rate;
    let contract = Arg::contract;

    Plan::builder()
        .stage(Stage::RegistriesDeployed)
        .deploy(DeploySpec::new(REGISTRY))
        .deploy(DeploySpec::new(PROVIDER).args(vec![Arg::string(&market.market_id)]))
        .configure(CallSpec::of::<IAddressesProviderRegistry::registerAddressesProviderCall>(
            REGISTRY,
            vec![contract(PROVIDER), Arg::u64(market.provider_id)],
        ))
        .assign(RoleAssignment::new(PROVIDER, RoleKind::PoolAdmin, Arg::Deployer))
        .assign(RoleAssignment::new(PROVIDER, RoleKind::EmergencyAdmin, Arg::Deployer))
        .assign(RoleAssignment::new(
            PROVIDER,
            RoleKind::LiquidationFeeRecipient,
            Arg::Treasury,
        ))
        .stage(Stage::CoreLibrariesLinked)
        .deploy(DeploySpec::new("ReserveLogic"))
        .deploy(DeploySpec::new("GenericLogic"))
        .deploy(DeploySpec::new("ValidationLogic").libraries(["GenericLogic"]))
        .deploy(
            DeploySpec::new(POOL_IMPL)
                .contract(POOL)
                .libraries(["ValidationLogic", "ReserveLogic"])
                .implementation(),
        )
        .stage(Stage::CoreProxyDeployed)
        .configure(CallSpec::of::<ILendingPool::initializeCall>(
            POOL_IMPL,
            vec![contract(PROVIDER)],
        ))
        .configure(CallSpec::of::<IAddressesProvider::setLendingPoolImplCall>(
            PROVIDER,
            vec![contract(POOL_IMPL)],
        ))
        .adopt_proxy(AdoptSpec {
            name: POOL.to_string(),
            factory: PROVIDER.to_string(),
            getter: IAddressesProvider::getLendingPoolCall::SIGNATURE.to_string(),
            implementation: POOL_IMPL.to_string(),
        })
        .deploy(
            DeploySpec::new(CONFIGURATOR_IMPL)
                .contract(CONFIGURATOR)
                .implementation(),
        )
        .configure(CallSpec::of::<IAddressesProvider::setLendingPoolConfiguratorImplCall>(
            PROVIDER,
            vec![contract(CONFIGURATOR_IMPL)],
        ))
        .adopt_proxy(AdoptSpec {
            name: CONFIGURATOR.to_string(),
            factory: PROVIDER.to_string(),
            getter: IAddressesProvider::getLendingPoolConfiguratorCall::SIGNATURE.to_string(),
            implementation: CONFIGURATOR_IMPL.to_string(),
        })
        .stage(Stage::HelpersDeployed)
        .deploy(DeploySpec::new(TOKENS_HELPER).args(vec![contract(POOL), contract(PROVIDER)]))
        .deploy(DeploySpec::new("ATokensAndRatesHelper").args(vec![
            contract(POOL),
            contract(PROVIDER),
            contract(CONFIGURATOR),
        ]))
        .stage(Stage::TokenizationImplsDeployed)
        .deploy(DeploySpec::new("AaveAToken").contract("AToken"))
        .deploy(DeploySpec::new("StableDebtToken"))
        .deploy(DeploySpec::new("VariableDebtToken"))
        .stage(Stage::OraclesWiredAndOwned)
        .deploy(DeploySpec::new(PRICE_ORACLE).args(vec![
            Arg::empty_array(),
            Arg::empty_array(),
            Arg::Address(Address::ZERO),
            Arg::Address(market.oracle_base_currency),
            Arg::uint(market.oracle_base_currency_unit),
        ]))
        .assign(RoleAssignment::new(
            PROVIDER,
            RoleKind::PriceOracle,
            contract(PRICE_ORACLE),
        ))
        .deploy(DeploySpec::new(RATE_ORACLE))
        .assign(RoleAssignment::new(
            PROVIDER,
            RoleKind::LendingRateOracle,
            contract(RATE_ORACLE),
        ))
        .borrow(OwnershipLoan {
            target: RATE_ORACLE.to_string(),
            borrower: TOKENS_HELPER.to_string(),
            calls: vec![CallSpec::of::<ITokensHelper::setOracleBorrowRatesCall>(
                TOKENS_HELPER,
                vec![Arg::empty_array(), Arg::empty_array(), contract(RATE_ORACLE)],
            )],
            hand_back: CallSpec::of::<ITokensHelper::setOracleOwnershipCall>(
                TOKENS_HELPER,
                vec![contract(RATE_ORACLE), Arg::Deployer],
            ),
            returns_to: Arg::Deployer,
        })
        .stage(Stage::RewardChainDeployedAndWired)
        .deploy(DeploySpec::new(STAKING_TOKEN))
        .deploy(
            DeploySpec::new(&smoke_test.underlying)
                .contract("MockToken")
                .args(vec![Arg::uint(reserve.underlying_supply)]),
        )
        .deploy(DeploySpec::new("MockChainlinkAggregatorFactory"))
        .deploy(DeploySpec::new(AGGREGATOR))
        .configure(CallSpec::of::<IChainlinkAggregator::setLatestAnswerCall>(
            AGGREGATOR,
            vec![Arg::int(reserve.price)],
        ))
        .deploy(DeploySpec::new(LP_TOKEN).args(vec![
            Arg::string("Mock LP"),
            Arg::string("MLP"),
            contract(STAKING_TOKEN),
            contract(STAKING_TOKEN),
            Arg::Array(rewards.lp_reserves.iter().copied().map(Arg::uint).collect()),
        ]))
        .configure(CallSpec::of::<ILpToken::mintCall>(LP_TOKEN, vec![]))
        .deploy(
            DeploySpec::new("DefaultProxyAdmin")
                .contract("ProxyAdmin")
                .args(vec![Arg::Deployer]),
        )
        .deploy_proxy(ProxySpec::new(
            PRICE_PROVIDER,
            InitializerSpec::new(
                IPriceProvider::initializeCall::SIGNATURE,
                vec![
                    contract(LP_TOKEN),
                    contract(STAKING_TOKEN),
                    contract(AGGREGATOR),
                    Arg::u64(rewards.price_lookback),
                ],
            ),
        ))
        .deploy(DeploySpec::new(STATS))
        .deploy_proxy(
            ProxySpec::new(
                LP_FEE_DISTRIBUTION,
                multi_fee_initializer(
                    rewards,
                    Arg::Address(Address::ZERO),
                    Arg::Address(Address::ZERO),
                ),
            )
            .contract(MULTI_FEE_DISTRIBUTION),
        )
        .deploy_proxy(ProxySpec::new(
            MULTI_FEE_DISTRIBUTION,
            multi_fee_initializer(rewards, contract(STAKING_TOKEN), contract(STATS)),
        ))
        .deploy_proxy(ProxySpec::new(
            MIDDLE_FEE_DISTRIBUTION,
            InitializerSpec::new(
                IMiddleFeeDistribution::initializeCall::SIGNATURE,
                vec![
                    contract(STAKING_TOKEN),
                    contract(STATS),
                    contract(LP_FEE_DISTRIBUTION),
                    contract(MULTI_FEE_DISTRIBUTION),
                ],
            ),
        ))
        .deploy(DeploySpec::new(ELIGIBLE_DATA_PROVIDER).args(vec![
            contract(POOL),
            contract(MIDDLE_FEE_DISTRIBUTION),
            contract(PRICE_PROVIDER),
            Arg::Address(Address::ZERO),
        ]))
        .deploy_proxy(ProxySpec::new(
            INCENTIVES_CONTROLLER,
            InitializerSpec::new(
                IChefIncentivesController::initializeCall::SIGNATURE,
                vec![
                    contract(CONFIGURATOR),
                    contract(ELIGIBLE_DATA_PROVIDER),
                    contract(MIDDLE_FEE_DISTRIBUTION),
                    Arg::uint(rewards.rewards_per_second),
                ],
            ),
        ))
        .assign(RoleAssignment::new(
            ELIGIBLE_DATA_PROVIDER,
            RoleKind::IncentivesController,
            contract(INCENTIVES_CONTROLLER),
        ))
        .deploy(DeploySpec::new(MERKLE_DISTRIBUTOR).args(vec![
            contract(MIDDLE_FEE_DISTRIBUTION),
            Arg::uint(rewards.merkle_distributor_supply),
        ]))
        .assign(RoleAssignment::new(
            LP_FEE_DISTRIBUTION,
            RoleKind::Minters,
            Arg::contracts([MIDDLE_FEE_DISTRIBUTION, INCENTIVES_CONTROLLER]),
        ))
        .assign(RoleAssignment::new(
            MULTI_FEE_DISTRIBUTION,
            RoleKind::Minters,
            Arg::contracts([MIDDLE_FEE_DISTRIBUTION, INCENTIVES_CONTROLLER]),
        ))
        .assign(RoleAssignment::new(
            MIDDLE_FEE_DISTRIBUTION,
            RoleKind::Minters,
            Arg::contracts([INCENTIVES_CONTROLLER, MERKLE_DISTRIBUTOR]),
        ))
        .hand_off(RoleAssignment::owner(
            MIDDLE_FEE_DISTRIBUTION,
            contract(CONFIGURATOR),
        ))
        .stage(Stage::ReserveBatchInitialized)
        .deploy(DeploySpec::new(RATE_STRATEGY).args(vec![
            contract(PROVIDER),
            Arg::uint(rates.optimal_utilization_rate),
            Arg::uint(rates.base_variable_borrow_rate),
            Arg::uint(rates.variable_rate_slope1),
            Arg::uint(rates.variable_rate_slope2),
            Arg::uint(rates.stable_rate_slope1),
            Arg::uint(rates.stable_rate_slope2),
        ]))
        .deploy(
            DeploySpec::new(&smoke_test.flash_loan_consumer)
                .contract(FLASH_LOAN)
                .args(vec![contract(PROVIDER)]),
        )
        .deploy(DeploySpec::new(PROTOCOL_ADMIN).args(vec![
            contract(PRICE_ORACLE),
            contract(TOKENS_HELPER),
            contract(CONFIGURATOR),
        ]))
        .hand_off(RoleAssignment::owner(PRICE_ORACLE, contract(PROTOCOL_ADMIN)))
        .hand_off(RoleAssignment::owner(TOKENS_HELPER, contract(PROTOCOL_ADMIN)))
        .hand_off(RoleAssignment::new(
            PROVIDER,
            RoleKind::PoolAdmin,
            contract(PROTOCOL_ADMIN),
        ))
        .configure(CallSpec::of::<IPriceOracle::setAssetSourcesCall>(
            PROTOCOL_ADMIN,
            vec![
                Arg::contracts([smoke_test.underlying.as_str()]),
                Arg::contracts([AGGREGATOR]),
            ],
        ))
        .init_reserves(ReserveBatch {
            via: PROTOCOL_ADMIN.to_string(),
            reserves: vec![ReserveInitSpec {
                a_token_impl: "AaveAToken".to_string(),
                stable_debt_token_impl: "StableDebtToken".to_string(),
                variable_debt_token_impl: "VariableDebtToken".to_string(),
                underlying_asset_decimals: reserve.decimals,
                interest_rate_strategy: RATE_STRATEGY.to_string(),
                underlying_asset: smoke_test.underlying.clone(),
                treasury: MIDDLE_FEE_DISTRIBUTION.to_string(),
                incentives_controller: INCENTIVES_CONTROLLER.to_string(),
                alloc_point: reserve.alloc_point,
                names: ReserveTokenNames::uniform(&reserve.token_name, &reserve.token_symbol),
                params: reserve.params.clone(),
            }],
        })
        .stage(Stage::OwnershipFinalized)
        .verify(RoleCheck::owner(PRICE_ORACLE, contract(PROTOCOL_ADMIN)))
        .verify(RoleCheck::owner(TOKENS_HELPER, contract(PROTOCOL_ADMIN)))
        .verify(RoleCheck::new(
            PROVIDER,
            RoleKind::PoolAdmin,
            contract(PROTOCOL_ADMIN),
        ))
        .verify(RoleCheck::new(PROVIDER, RoleKind::EmergencyAdmin, Arg::Deployer))
        .verify(RoleCheck::new(
            PROVIDER,
            RoleKind::PriceOracle,
            contract(PRICE_ORACLE),
        ))
        .verify(RoleCheck::new(
            PROVIDER,
            RoleKind::LendingRateOracle,
            contract(RATE_ORACLE),
        ))
        .verify(RoleCheck::owner(MIDDLE_FEE_DISTRIBUTION, contract(CONFIGURATOR)))
        .verify(RoleCheck::owner(RATE_ORACLE, Arg::Deployer))
        .stage(Stage::SmokeTested)
        .smoke_test(smoke_test.clone())
        .build()
}

fn multi_fee_initializer(rewards: &RewardsConfig, reward_token: Arg, stats: Arg) -> InitializerSpec {
    InitializerSpec::new(
        IMultiFeeDistribution::initializeCall::SIGNATURE,
        vec![
            reward_token,
            Arg::contract(STAKING_TOKEN),
            stats,
            Arg::contract(PRICE_PROVIDER),
            Arg::u64(rewards.rewards_duration),
            Arg::u64(rewards.rewards_lookback),
            Arg::u64(rewards.lock_duration),
        ],
    )
}
