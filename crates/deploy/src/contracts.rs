//! ABI bindings for the contract surface the orchestrator touches.
//!
//! Only the functions that are actually called are declared. Plan steps take
//! their signatures from these bindings (`Call::SIGNATURE`) so the plan and
//! the encoder can never disagree.

use alloy_sol_types::sol;

sol! {
    interface IOwnable {
        function owner() external view returns (address);
        function transferOwnership(address newOwner) external;
    }

    interface IERC20Mintable {
        function name() external view returns (string);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
        function mint(address to, uint256 amount) external;
    }

    interface ILpToken {
        function mint() external;
    }

    interface IAddressesProviderRegistry {
        function registerAddressesProvider(address provider, uint256 id) external;
    }

    interface IAddressesProvider {
        function setPoolAdmin(address admin) external;
        function setEmergencyAdmin(address admin) external;
        function setLiquidationFeeTo(address recipient) external;
        function setPriceOracle(address oracle) external;
        function setLendingRateOracle(address oracle) external;
        function setLendingPoolImpl(address pool) external;
        function setLendingPoolConfiguratorImpl(address configurator) external;
        function getLendingPool() external view returns (address);
        function getLendingPoolConfigurator() external view returns (address);
        function getPoolAdmin() external view returns (address);
        function getEmergencyAdmin() external view returns (address);
        function getPriceOracle() external view returns (address);
        function getLendingRateOracle() external view returns (address);
    }

    struct ReserveConfigurationMap {
        uint256 data;
    }

    struct ReserveData {
        ReserveConfigurationMap configuration;
        uint128 liquidityIndex;
        uint128 variableBorrowIndex;
        uint128 currentLiquidityRate;
        uint128 currentVariableBorrowRate;
        uint128 currentStableBorrowRate;
        uint40 lastUpdateTimestamp;
        address aTokenAddress;
        address stableDebtTokenAddress;
        address variableDebtTokenAddress;
        address interestRateStrategyAddress;
        uint8 id;
    }

    interface ILendingPool {
        function initialize(address provider) external;
        function deposit(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
        function getReserveData(address asset) external view returns (ReserveData memory);
    }

    struct InitReserveInput {
        address aTokenImpl;
        address stableDebtTokenImpl;
        address variableDebtTokenImpl;
        uint8 underlyingAssetDecimals;
        address interestRateStrategyAddress;
        address underlyingAsset;
        address treasury;
        address incentivesController;
        uint256 allocPoint;
        string underlyingAssetName;
        string aTokenName;
        string aTokenSymbol;
        string variableDebtTokenName;
        string variableDebtTokenSymbol;
        string stableDebtTokenName;
        string stableDebtTokenSymbol;
        bytes params;
    }

    interface IReserveInitializer {
        function batchInitReserve(InitReserveInput[] calldata input) external;
    }

    interface IPriceOracle {
        function setAssetSources(address[] calldata assets, address[] calldata sources) external;
        function getSourceOfAsset(address asset) external view returns (address);
    }

    interface ILendingRateOracle {
        function setMarketBorrowRate(address asset, uint256 rate) external;
        function getMarketBorrowRate(address asset) external view returns (uint256);
    }

    interface ITokensHelper {
        function setOracleBorrowRates(address[] calldata assets, uint256[] calldata rates, address oracle) external;
        function setOracleOwnership(address oracle, address admin) external;
    }

    interface IChainlinkAggregator {
        function setLatestAnswer(int256 answer) external;
        function latestAnswer() external view returns (int256);
    }

    interface IPriceProvider {
        function initialize(address pair, address token, address aggregator, uint256 lookback) external;
    }

    interface IMultiFeeDistribution {
        function initialize(
            address rewardToken,
            address stakingToken,
            address stats,
            address priceProvider,
            uint256 rewardsDuration,
            uint256 rewardsLookback,
            uint256 lockDuration
        ) external;
        function setMinters(address[] calldata minters) external;
    }

    interface IMiddleFeeDistribution {
        function initialize(
            address rewardToken,
            address stats,
            address lpFeeDistribution,
            address multiFeeDistribution
        ) external;
    }

    interface IChefIncentivesController {
        function initialize(
            address poolConfigurator,
            address eligibleDataProvider,
            address rewardMinter,
            uint256 rewardsPerSecond
        ) external;
    }

    interface IRewardEligibleDataProvider {
        function setChefIncentivesController(address controller) external;
    }

    interface IFlashLoanConsumer {
        function flashLoanCall(address[] calldata assets, uint256[] calldata amounts) external;
    }
}
