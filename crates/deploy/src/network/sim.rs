//! In-process chain for dry runs and tests.
//!
//! The simulator does not execute EVM bytecode. It recognises contracts by
//! artifact name and models the behaviour a deployment depends on: ownership
//! checks, one-time initializers, proxies created by the addresses provider,
//! ERC-20 ledgers, reserve initialization, deposits and flash loans. A
//! reverted transaction leaves no trace besides the consumed nonce.

use std::collections::HashMap;

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue},
    primitives::{Address, B256, Bytes, I256, U256, keccak256},
};
use alloy_sol_types::SolCall;
use tokio::sync::Mutex;

use super::{CallTx, DeployTx, Network, Receipt};
use crate::{abi::ray, contracts::*, error::NetworkError};

const ALREADY_INITIALIZED: &str = "Initializable: contract is already initialized";
const NOT_OWNER: &str = "Ownable: caller is not the owner";
const NOT_POOL_ADMIN: &str = "CALLER_NOT_POOL_ADMIN";
const INJECTED_FAILURE: &str = "simulated failure";
const ACCOUNT_COUNT: u8 = 10;
const GAS_PER_TX: u64 = 21_000;

type Revert = String;

/// A transaction as mined by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTransaction {
    pub from: Address,
    /// Call target, or the created address for a successful deployment.
    pub to: Option<Address>,
    /// Artifact name of the created or called contract.
    pub contract: String,
    /// Function selector, `None` for deployments.
    pub selector: Option<[u8; 4]>,
    /// Revert reason, if the transaction failed.
    pub reverted: Option<String>,
}

#[derive(Debug, Clone)]
enum Fault {
    Call([u8; 4]),
    Deploy(String),
}

#[derive(Debug, Clone, Copy)]
struct SimReserve {
    a_token: Address,
    stable_debt: Address,
    variable_debt: Address,
    strategy: Address,
    id: u8,
}

#[derive(Debug, Clone, Default)]
struct SimContract {
    /// Artifact name; proxies take the name of their logic contract.
    contract: String,
    owner: Option<Address>,
    initialized: bool,
    implementation: Option<Address>,
    refs: HashMap<&'static str, Address>,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    token_name: String,
    minters: Option<Vec<Address>>,
    reserves: HashMap<Address, SimReserve>,
    sources: HashMap<Address, Address>,
    rates: HashMap<Address, U256>,
    answer: Option<I256>,
}

#[derive(Debug, Clone, Default)]
struct SimState {
    accounts: Vec<Address>,
    nonces: HashMap<Address, u64>,
    block_number: u64,
    contracts: HashMap<Address, SimContract>,
    faults: Vec<Fault>,
    transactions: Vec<SimTransaction>,
    flash_loan_premium_bps: u64,
}

/// A simulated chain with ten unlocked accounts.
pub struct SimulatedNetwork {
    state: Mutex<SimState>,
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        let state = SimState {
            accounts: (1..=ACCOUNT_COUNT).map(Address::with_last_byte).collect(),
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make every call to `signature` revert, at any call depth.
    pub fn failing_call(mut self, signature: &str) -> Self {
        self.state
            .get_mut()
            .faults
            .push(Fault::Call(crate::abi::selector(signature)));
        self
    }

    /// Make every deployment of the `contract` artifact revert.
    pub fn failing_deploy(mut self, contract: &str) -> Self {
        self.state
            .get_mut()
            .faults
            .push(Fault::Deploy(contract.to_string()));
        self
    }

    /// Flash loan fee in basis points, zero by default.
    pub fn with_flash_loan_premium(mut self, bps: u64) -> Self {
        self.state.get_mut().flash_loan_premium_bps = bps;
        self
    }

    /// Every mined transaction, reverted ones included.
    pub async fn transactions(&self) -> Vec<SimTransaction> {
        self.state.lock().await.transactions.clone()
    }

    pub async fn owner_of(&self, contract: Address) -> Option<Address> {
        let state = self.state.lock().await;
        state.contracts.get(&contract).and_then(|c| c.owner)
    }

    pub async fn minters_of(&self, contract: Address) -> Option<Vec<Address>> {
        let state = self.state.lock().await;
        state.contracts.get(&contract).and_then(|c| c.minters.clone())
    }

    pub async fn implementation_of(&self, proxy: Address) -> Option<Address> {
        let state = self.state.lock().await;
        state.contracts.get(&proxy).and_then(|c| c.implementation)
    }

    pub async fn balance_of(&self, token: Address, holder: Address) -> U256 {
        let state = self.state.lock().await;
        state.balance(token, holder)
    }
}

impl Network for SimulatedNetwork {
    async fn accounts(&self) -> Result<Vec<Address>, NetworkError> {
        Ok(self.state.lock().await.accounts.clone())
    }

    async fn deploy(&self, tx: DeployTx) -> Result<Receipt, NetworkError> {
        let mut state = self.state.lock().await;
        state.ensure_unlocked(tx.from)?;

        let (tx_hash, outcome) = state.commit(tx.from, |state| state.apply_deploy(&tx));
        state.transactions.push(SimTransaction {
            from: tx.from,
            to: outcome.as_ref().ok().copied(),
            contract: tx.contract.clone(),
            selector: None,
            reverted: outcome.as_ref().err().cloned(),
        });

        let address = outcome.map_err(|reason| NetworkError::Reverted { tx_hash, reason })?;
        Ok(state.receipt(tx_hash, Some(address)))
    }

    async fn send(&self, tx: CallTx) -> Result<Receipt, NetworkError> {
        let mut state = self.state.lock().await;
        state.ensure_unlocked(tx.from)?;

        let contract = state
            .contracts
            .get(&tx.to)
            .map(|c| c.contract.clone())
            .unwrap_or_default();
        let (tx_hash, outcome) = state.commit(tx.from, |state| {
            state.bump_nonce(tx.from);
            state.execute(tx.from, tx.to, &tx.data)
        });
        state.transactions.push(SimTransaction {
            from: tx.from,
            to: Some(tx.to),
            contract,
            selector: tx.data.get(..4).and_then(|s| s.try_into().ok()),
            reverted: outcome.as_ref().err().cloned(),
        });

        outcome.map_err(|reason| NetworkError::Reverted { tx_hash, reason })?;
        Ok(state.receipt(tx_hash, None))
    }

    async fn call(&self, tx: CallTx) -> Result<Bytes, NetworkError> {
        let mut scratch = self.state.lock().await.clone();
        scratch
            .execute(tx.from, tx.to, &tx.data)
            .map(Bytes::from)
            .map_err(|reason| NetworkError::Rejected(format!("execution reverted: {reason}")))
    }
}

impl SimState {
    fn ensure_unlocked(&self, account: Address) -> Result<(), NetworkError> {
        if !self.accounts.contains(&account) {
            return Err(NetworkError::Rejected(format!("unknown account {account}")));
        }
        Ok(())
    }

    /// Run `apply` as one transaction, rolling everything but the sender's
    /// nonce back if it reverts.
    fn commit<T>(
        &mut self,
        from: Address,
        apply: impl FnOnce(&mut Self) -> Result<T, Revert>,
    ) -> (B256, Result<T, Revert>) {
        let snapshot = self.clone();
        let nonce = self.nonces.get(&from).copied().unwrap_or_default();

        let outcome = apply(self);
        if outcome.is_err() {
            *self = snapshot;
            self.nonces.insert(from, nonce + 1);
        }
        self.block_number += 1;

        let tx_hash = keccak256([from.as_slice(), &nonce.to_be_bytes()].concat());
        (tx_hash, outcome)
    }

    fn receipt(&self, tx_hash: B256, contract_address: Option<Address>) -> Receipt {
        Receipt {
            tx_hash,
            block_number: self.block_number,
            contract_address,
            gas_used: GAS_PER_TX,
        }
    }

    fn bump_nonce(&mut self, account: Address) -> u64 {
        let nonce = self.nonces.entry(account).or_default();
        let current = *nonce;
        *nonce += 1;
        current
    }

    fn create(&mut self, creator: Address, contract: &str) -> Address {
        let nonce = self.bump_nonce(creator);
        let address = creator.create(nonce);
        self.nonces.insert(address, 1);
        self.contracts.insert(
            address,
            SimContract {
                contract: contract.to_string(),
                ..Default::default()
            },
        );
        address
    }

    fn contract(&self, at: Address) -> Result<&SimContract, Revert> {
        self.contracts
            .get(&at)
            .ok_or_else(|| format!("no contract at {at}"))
    }

    fn contract_mut(&mut self, at: Address) -> Result<&mut SimContract, Revert> {
        self.contracts
            .get_mut(&at)
            .ok_or_else(|| format!("no contract at {at}"))
    }

    fn reference(&self, at: Address, key: &str) -> Result<Address, Revert> {
        self.contract(at)?
            .refs
            .get(key)
            .copied()
            .ok_or_else(|| format!("{key} is not set on {at}"))
    }

    fn balance(&self, token: Address, holder: Address) -> U256 {
        self.contracts
            .get(&token)
            .and_then(|c| c.balances.get(&holder).copied())
            .unwrap_or_default()
    }

    fn only_owner(&self, at: Address, caller: Address) -> Result<(), Revert> {
        if self.contract(at)?.owner != Some(caller) {
            return Err(NOT_OWNER.to_string());
        }
        Ok(())
    }

    fn initialize(&mut self, caller: Address, at: Address) -> Result<(), Revert> {
        let contract = self.contract_mut(at)?;
        if contract.initialized {
            return Err(ALREADY_INITIALIZED.to_string());
        }
        contract.initialized = true;
        contract.owner.get_or_insert(caller);
        Ok(())
    }

    fn set_ref(
        &mut self,
        caller: Address,
        at: Address,
        key: &'static str,
        value: Address,
    ) -> Result<Vec<u8>, Revert> {
        self.only_owner(at, caller)?;
        self.contract_mut(at)?.refs.insert(key, value);
        Ok(Vec::new())
    }

    fn get_ref(&self, at: Address, key: &str) -> Result<Vec<u8>, Revert> {
        let value = self
            .contract(at)?
            .refs
            .get(key)
            .copied()
            .unwrap_or_default();
        Ok(returns(vec![DynSolValue::Address(value)]))
    }

    fn move_tokens(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), Revert> {
        let ledger = &mut self.contract_mut(token)?.balances;
        let balance = ledger.get(&from).copied().unwrap_or_default();
        let remaining = balance
            .checked_sub(amount)
            .ok_or("ERC20: transfer amount exceeds balance")?;
        ledger.insert(from, remaining);
        *ledger.entry(to).or_default() += amount;
        Ok(())
    }

    fn reserve(&self, pool: Address, asset: Address) -> Result<SimReserve, Revert> {
        self.contract(pool)?
            .reserves
            .get(&asset)
            .copied()
            .ok_or_else(|| format!("no active reserve for {asset}"))
    }

    fn apply_deploy(&mut self, tx: &DeployTx) -> Result<Address, Revert> {
        let faulty = self
            .faults
            .iter()
            .any(|fault| matches!(fault, Fault::Deploy(contract) if *contract == tx.contract));
        if faulty {
            return Err(INJECTED_FAILURE.to_string());
        }
        if tx.bytecode.is_empty() {
            return Err("empty creation code".to_string());
        }

        let address = self.create(tx.from, &tx.contract);
        self.construct(tx.from, address, &tx.contract, &tx.constructor_args)?;
        Ok(address)
    }

    fn construct(
        &mut self,
        from: Address,
        at: Address,
        contract: &str,
        args: &[u8],
    ) -> Result<(), Revert> {
        match contract {
            "TransparentUpgradeableProxy" => {
                let values = decode_params("(address,address,bytes)", args)?;
                let logic = address_at(&values, 0)?;
                let admin = address_at(&values, 1)?;
                let init = bytes_at(&values, 2)?;

                let logic_contract = self.contract(logic)?.contract.clone();
                let proxy = self.contract_mut(at)?;
                proxy.contract = logic_contract;
                proxy.implementation = Some(logic);
                proxy.refs.insert("admin", admin);
                if !init.is_empty() {
                    self.execute(from, at, &init)?;
                }
            }
            "MockToken" | "MockStakingToken" => {
                let supply = if args.is_empty() {
                    U256::ZERO
                } else {
                    uint_at(&decode_params("(uint256)", args)?, 0)?
                };
                let token = self.contract_mut(at)?;
                token.owner = Some(from);
                token.token_name = if contract == "MockToken" {
                    "Mock Token".to_string()
                } else {
                    "Mock Staking Token".to_string()
                };
                token.balances.insert(from, supply);
            }
            "AaveOracle" => {
                let values = decode_params("(address[],address[],address,address,uint256)", args)?;
                let assets = addresses_at(&values, 0)?;
                let sources = addresses_at(&values, 1)?;
                if assets.len() != sources.len() {
                    return Err("INCONSISTENT_PARAMS_LENGTH".to_string());
                }
                let oracle = self.contract_mut(at)?;
                oracle.owner = Some(from);
                oracle.sources.extend(assets.into_iter().zip(sources));
            }
            "StableAndVariableTokensHelper" => {
                let values = decode_params("(address,address)", args)?;
                let helper = self.contract_mut(at)?;
                helper.owner = Some(from);
                helper.refs.insert("pool", address_at(&values, 0)?);
                helper.refs.insert("provider", address_at(&values, 1)?);
            }
            "MockProtocolAdmin" => {
                let values = decode_params("(address,address,address)", args)?;
                let admin = self.contract_mut(at)?;
                admin.owner = Some(from);
                admin.refs.insert("oracle", address_at(&values, 0)?);
                admin.refs.insert("helper", address_at(&values, 1)?);
                admin.refs.insert("configurator", address_at(&values, 2)?);
            }
            "MockFlashLoan" => {
                let values = decode_params("(address)", args)?;
                let consumer = self.contract_mut(at)?;
                consumer.owner = Some(from);
                consumer.refs.insert("provider", address_at(&values, 0)?);
            }
            "ProxyAdmin" => {
                let owner = if args.is_empty() {
                    from
                } else {
                    address_at(&decode_params("(address)", args)?, 0)?
                };
                self.contract_mut(at)?.owner = Some(owner);
            }
            _ => self.contract_mut(at)?.owner = Some(from),
        }
        Ok(())
    }

    fn execute(&mut self, from: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if data.len() < 4 {
            return Err("missing function selector".to_string());
        }
        let faulty = self
            .faults
            .iter()
            .any(|fault| matches!(fault, Fault::Call(selector) if data.starts_with(selector)));
        if faulty {
            return Err(INJECTED_FAILURE.to_string());
        }

        if decode::<IOwnable::ownerCall>(data)?.is_some() {
            let owner = self.contract(to)?.owner.unwrap_or_default();
            return Ok(returns(vec![DynSolValue::Address(owner)]));
        }
        if let Some(call) = decode::<IOwnable::transferOwnershipCall>(data)? {
            self.only_owner(to, from)?;
            self.contract_mut(to)?.owner = Some(call.newOwner);
            return Ok(Vec::new());
        }

        let contract = self.contract(to)?.contract.clone();
        match contract.as_str() {
            "MockToken" | "MockStakingToken" => self.token(from, to, data),
            "LendingPoolAddressesProviderRegistry" => self.provider_registry(from, to, data),
            "LendingPoolAddressesProvider" => self.addresses_provider(from, to, data),
            "LendingPool" => self.lending_pool(from, to, data),
            "LendingPoolConfigurator" => self.configurator(from, to, data),
            "AaveOracle" => self.price_oracle(from, to, data),
            "LendingRateOracle" => self.rate_oracle(from, to, data),
            "StableAndVariableTokensHelper" => self.tokens_helper(from, to, data),
            "MockChainlinkAggregator" => self.aggregator(to, data),
            "MockLpContract" => self.lp_token(&contract, data),
            "PriceProvider" => self.price_provider(from, to, data),
            "MultiFeeDistribution" | "MiddleFeeDistribution" => {
                self.fee_distribution(from, to, data)
            }
            "ChefIncentivesController" => self.incentives_controller(from, to, data),
            "RewardEligibleDataProvider" => self.eligible_data_provider(from, to, data),
            "MockProtocolAdmin" => self.protocol_admin(from, to, data),
            "MockFlashLoan" => self.flash_loan_consumer(to, data),
            _ => Err(unrecognized(&contract, data)),
        }
    }

    fn token(&mut self, from: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        use IERC20Mintable::*;

        if decode::<nameCall>(data)?.is_some() {
            let name = self.contract(to)?.token_name.clone();
            return Ok(returns(vec![DynSolValue::String(name)]));
        }
        if let Some(call) = decode::<balanceOfCall>(data)? {
            return Ok(returns(vec![uint(self.balance(to, call.account))]));
        }
        if let Some(call) = decode::<allowanceCall>(data)? {
            let allowance = self
                .contract(to)?
                .allowances
                .get(&(call.owner, call.spender))
                .copied()
                .unwrap_or_default();
            return Ok(returns(vec![uint(allowance)]));
        }
        if let Some(call) = decode::<approveCall>(data)? {
            self.contract_mut(to)?
                .allowances
                .insert((from, call.spender), call.amount);
            return Ok(returns(vec![DynSolValue::Bool(true)]));
        }
        if let Some(call) = decode::<transferCall>(data)? {
            self.move_tokens(to, from, call.to, call.amount)?;
            return Ok(returns(vec![DynSolValue::Bool(true)]));
        }
        if let Some(call) = decode::<transferFromCall>(data)? {
            let allowances = &mut self.contract_mut(to)?.allowances;
            let allowance = allowances
                .get(&(call.from, from))
                .copied()
                .unwrap_or_default();
            let remaining = allowance
                .checked_sub(call.amount)
                .ok_or("ERC20: insufficient allowance")?;
            allowances.insert((call.from, from), remaining);
            self.move_tokens(to, call.from, call.to, call.amount)?;
            return Ok(returns(vec![DynSolValue::Bool(true)]));
        }
        if let Some(call) = decode::<mintCall>(data)? {
            *self
                .contract_mut(to)?
                .balances
                .entry(call.to)
                .or_default() += call.amount;
            return Ok(Vec::new());
        }
        Err(unrecognized("MockToken", data))
    }

    fn provider_registry(
        &mut self,
        from: Address,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, Revert> {
        if let Some(call) =
            decode::<IAddressesProviderRegistry::registerAddressesProviderCall>(data)?
        {
            if call.id.is_zero() {
                return Err("INVALID_ADDRESSES_PROVIDER_ID".to_string());
            }
            return self.set_ref(from, to, "provider", call.provider);
        }
        Err(unrecognized("LendingPoolAddressesProviderRegistry", data))
    }

    fn addresses_provider(
        &mut self,
        from: Address,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, Revert> {
        use IAddressesProvider::*;

        if let Some(call) = decode::<setPoolAdminCall>(data)? {
            return self.set_ref(from, to, "poolAdmin", call.admin);
        }
        if let Some(call) = decode::<setEmergencyAdminCall>(data)? {
            return self.set_ref(from, to, "emergencyAdmin", call.admin);
        }
        if let Some(call) = decode::<setLiquidationFeeToCall>(data)? {
            return self.set_ref(from, to, "liquidationFeeTo", call.recipient);
        }
        if let Some(call) = decode::<setPriceOracleCall>(data)? {
            return self.set_ref(from, to, "priceOracle", call.oracle);
        }
        if let Some(call) = decode::<setLendingRateOracleCall>(data)? {
            return self.set_ref(from, to, "lendingRateOracle", call.oracle);
        }
        if let Some(call) = decode::<setLendingPoolImplCall>(data)? {
            self.only_owner(to, from)?;
            self.upgrade_or_create(to, "lendingPool", call.pool)?;
            return Ok(Vec::new());
        }
        if let Some(call) = decode::<setLendingPoolConfiguratorImplCall>(data)? {
            self.only_owner(to, from)?;
            self.upgrade_or_create(to, "lendingPoolConfigurator", call.configurator)?;
            return Ok(Vec::new());
        }

        let getters: [([u8; 4], &str); 6] = [
            (getLendingPoolCall::SELECTOR, "lendingPool"),
            (getLendingPoolConfiguratorCall::SELECTOR, "lendingPoolConfigurator"),
            (getPoolAdminCall::SELECTOR, "poolAdmin"),
            (getEmergencyAdminCall::SELECTOR, "emergencyAdmin"),
            (getPriceOracleCall::SELECTOR, "priceOracle"),
            (getLendingRateOracleCall::SELECTOR, "lendingRateOracle"),
        ];
        if let Some((_, key)) = getters.iter().find(|(s, _)| data.starts_with(s)) {
            return self.get_ref(to, key);
        }
        Err(unrecognized("LendingPoolAddressesProvider", data))
    }

    /// The provider owns the pool and configurator proxies: the first
    /// implementation creates and initializes the proxy, later ones upgrade it.
    fn upgrade_or_create(
        &mut self,
        provider: Address,
        key: &'static str,
        implementation: Address,
    ) -> Result<(), Revert> {
        let logic = self.contract(implementation)?.contract.clone();
        if let Some(proxy) = self.contract(provider)?.refs.get(key).copied() {
            self.contract_mut(proxy)?.implementation = Some(implementation);
            return Ok(());
        }

        let proxy = self.create(provider, &logic);
        self.contract_mut(proxy)?.implementation = Some(implementation);
        let init = ILendingPool::initializeCall { provider }.abi_encode();
        self.execute(provider, proxy, &init)?;
        self.contract_mut(provider)?.refs.insert(key, proxy);
        Ok(())
    }

    fn lending_pool(&mut self, from: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if let Some(call) = decode::<ILendingPool::initializeCall>(data)? {
            self.initialize(from, to)?;
            self.contract_mut(to)?.refs.insert("provider", call.provider);
            return Ok(Vec::new());
        }
        if let Some(call) = decode::<ILendingPool::depositCall>(data)? {
            let reserve = self.reserve(to, call.asset)?;
            let pull = IERC20Mintable::transferFromCall {
                from,
                to: reserve.a_token,
                amount: call.amount,
            }
            .abi_encode();
            self.execute(to, call.asset, &pull)?;
            *self
                .contract_mut(reserve.a_token)?
                .balances
                .entry(call.onBehalfOf)
                .or_default() += call.amount;
            return Ok(Vec::new());
        }
        if let Some(call) = decode::<ILendingPool::getReserveDataCall>(data)? {
            let reserve = self.reserve(to, call.asset)?;
            return Ok(reserve_data(&reserve));
        }
        Err(unrecognized("LendingPool", data))
    }

    fn configurator(&mut self, from: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if let Some(call) = decode::<ILendingPool::initializeCall>(data)? {
            self.initialize(from, to)?;
            self.contract_mut(to)?.refs.insert("provider", call.provider);
            return Ok(Vec::new());
        }
        if let Some(call) = decode::<IReserveInitializer::batchInitReserveCall>(data)? {
            let provider = self.reference(to, "provider")?;
            if self.reference(provider, "poolAdmin")? != from {
                return Err(NOT_POOL_ADMIN.to_string());
            }
            let pool = self.reference(provider, "lendingPool")?;

            for input in call.input {
                // Each aToken is registered with the treasury, which the
                // configurator must own.
                let treasury = self.contract(input.treasury)?;
                if treasury.contract.ends_with("FeeDistribution") && treasury.owner != Some(to) {
                    return Err(NOT_OWNER.to_string());
                }
                if self.contract(pool)?.reserves.contains_key(&input.underlyingAsset) {
                    return Err("RESERVE_ALREADY_INITIALIZED".to_string());
                }

                let reserve = SimReserve {
                    a_token: self.create(to, "AToken"),
                    stable_debt: self.create(to, "StableDebtToken"),
                    variable_debt: self.create(to, "VariableDebtToken"),
                    strategy: input.interestRateStrategyAddress,
                    id: self.contract(pool)?.reserves.len() as u8,
                };
                self.contract_mut(pool)?
                    .reserves
                    .insert(input.underlyingAsset, reserve);
            }
            return Ok(Vec::new());
        }
        Err(unrecognized("LendingPoolConfigurator", data))
    }

    fn price_oracle(&mut self, from: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if let Some(call) = decode::<IPriceOracle::setAssetSourcesCall>(data)? {
            self.only_owner(to, from)?;
            if call.assets.len() != call.sources.len() {
                return Err("INCONSISTENT_PARAMS_LENGTH".to_string());
            }
            self.contract_mut(to)?
                .sources
                .extend(call.assets.into_iter().zip(call.sources));
            return Ok(Vec::new());
        }
        if let Some(call) = decode::<IPriceOracle::getSourceOfAssetCall>(data)? {
            let source = self
                .contract(to)?
                .sources
                .get(&call.asset)
                .copied()
                .unwrap_or_default();
            return Ok(returns(vec![DynSolValue::Address(source)]));
        }
        Err(unrecognized("AaveOracle", data))
    }

    fn rate_oracle(&mut self, from: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if let Some(call) = decode::<ILendingRateOracle::setMarketBorrowRateCall>(data)? {
            self.only_owner(to, from)?;
            self.contract_mut(to)?.rates.insert(call.asset, call.rate);
            return Ok(Vec::new());
        }
        if let Some(call) = decode::<ILendingRateOracle::getMarketBorrowRateCall>(data)? {
            let rate = self
                .contract(to)?
                .rates
                .get(&call.asset)
                .copied()
                .unwrap_or_default();
            return Ok(returns(vec![uint(rate)]));
        }
        Err(unrecognized("LendingRateOracle", data))
    }

    fn tokens_helper(&mut self, from: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if let Some(call) = decode::<ITokensHelper::setOracleBorrowRatesCall>(data)? {
            self.only_owner(to, from)?;
            if call.assets.len() != call.rates.len() {
                return Err("Internal error: inconsistent params length".to_string());
            }
            // The helper acts as the oracle's owner for the whole batch.
            if self.contract(call.oracle)?.owner != Some(to) {
                return Err(NOT_OWNER.to_string());
            }
            for (asset, rate) in call.assets.iter().zip(&call.rates) {
                let set_rate = ILendingRateOracle::setMarketBorrowRateCall {
                    asset: *asset,
                    rate: *rate,
                }
                .abi_encode();
                self.execute(to, call.oracle, &set_rate)?;
            }
            return Ok(Vec::new());
        }
        if let Some(call) = decode::<ITokensHelper::setOracleOwnershipCall>(data)? {
            self.only_owner(to, from)?;
            let transfer = IOwnable::transferOwnershipCall {
                newOwner: call.admin,
            }
            .abi_encode();
            return self.execute(to, call.oracle, &transfer);
        }
        Err(unrecognized("StableAndVariableTokensHelper", data))
    }

    fn aggregator(&mut self, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if let Some(call) = decode::<IChainlinkAggregator::setLatestAnswerCall>(data)? {
            self.contract_mut(to)?.answer = Some(call.answer);
            return Ok(Vec::new());
        }
        if decode::<IChainlinkAggregator::latestAnswerCall>(data)?.is_some() {
            let answer = self.contract(to)?.answer.unwrap_or(I256::ZERO);
            return Ok(returns(vec![DynSolValue::Int(answer, 256)]));
        }
        Err(unrecognized("MockChainlinkAggregator", data))
    }

    fn lp_token(&mut self, contract: &str, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if decode::<ILpToken::mintCall>(data)?.is_some() {
            return Ok(Vec::new());
        }
        Err(unrecognized(contract, data))
    }

    fn price_provider(&mut self, from: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if let Some(call) = decode::<IPriceProvider::initializeCall>(data)? {
            self.initialize(from, to)?;
            let provider = self.contract_mut(to)?;
            provider.refs.insert("pair", call.pair);
            provider.refs.insert("aggregator", call.aggregator);
            return Ok(Vec::new());
        }
        Err(unrecognized("PriceProvider", data))
    }

    fn fee_distribution(
        &mut self,
        from: Address,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, Revert> {
        if decode::<IMultiFeeDistribution::initializeCall>(data)?.is_some()
            || decode::<IMiddleFeeDistribution::initializeCall>(data)?.is_some()
        {
            self.initialize(from, to)?;
            return Ok(Vec::new());
        }
        if let Some(call) = decode::<IMultiFeeDistribution::setMintersCall>(data)? {
            self.only_owner(to, from)?;
            let distribution = self.contract_mut(to)?;
            if distribution.minters.is_some() {
                return Err("minters already set".to_string());
            }
            distribution.minters = Some(call.minters);
            return Ok(Vec::new());
        }
        Err(unrecognized("FeeDistribution", data))
    }

    fn incentives_controller(
        &mut self,
        from: Address,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, Revert> {
        if let Some(call) = decode::<IChefIncentivesController::initializeCall>(data)? {
            self.initialize(from, to)?;
            let controller = self.contract_mut(to)?;
            controller.refs.insert("poolConfigurator", call.poolConfigurator);
            controller.refs.insert("rewardMinter", call.rewardMinter);
            return Ok(Vec::new());
        }
        Err(unrecognized("ChefIncentivesController", data))
    }

    fn eligible_data_provider(
        &mut self,
        from: Address,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, Revert> {
        if let Some(call) =
            decode::<IRewardEligibleDataProvider::setChefIncentivesControllerCall>(data)?
        {
            return self.set_ref(from, to, "chefIncentivesController", call.controller);
        }
        Err(unrecognized("RewardEligibleDataProvider", data))
    }

    /// Forwards privileged calls, acting as their sender.
    fn protocol_admin(&mut self, from: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if decode::<IPriceOracle::setAssetSourcesCall>(data)?.is_some() {
            self.only_owner(to, from)?;
            let oracle = self.reference(to, "oracle")?;
            return self.execute(to, oracle, data);
        }
        if decode::<IReserveInitializer::batchInitReserveCall>(data)?.is_some() {
            self.only_owner(to, from)?;
            let configurator = self.reference(to, "configurator")?;
            return self.execute(to, configurator, data);
        }
        Err(unrecognized("MockProtocolAdmin", data))
    }

    /// Borrows from each reserve and repays principal plus premium at once.
    fn flash_loan_consumer(&mut self, to: Address, data: &[u8]) -> Result<Vec<u8>, Revert> {
        if let Some(call) = decode::<IFlashLoanConsumer::flashLoanCallCall>(data)? {
            if call.assets.len() != call.amounts.len() {
                return Err("INCONSISTENT_FLASHLOAN_PARAMS".to_string());
            }
            let provider = self.reference(to, "provider")?;
            let pool = self.reference(provider, "lendingPool")?;
            let premium_bps = U256::from(self.flash_loan_premium_bps);

            for (asset, amount) in call.assets.iter().zip(&call.amounts) {
                let reserve = self.reserve(pool, *asset)?;
                let premium = *amount * premium_bps / U256::from(10_000u64);
                self.move_tokens(*asset, reserve.a_token, to, *amount)?;
                self.move_tokens(*asset, to, reserve.a_token, *amount + premium)?;
            }
            return Ok(Vec::new());
        }
        Err(unrecognized("MockFlashLoan", data))
    }
}

/// Decode `data` as a call to `C` if the selector matches.
fn decode<C: SolCall>(data: &[u8]) -> Result<Option<C>, Revert> {
    if !data.starts_with(&C::SELECTOR) {
        return Ok(None);
    }
    C::abi_decode(data, true)
        .map(Some)
        .map_err(|e| format!("invalid calldata for {}: {e}", C::SIGNATURE))
}

fn unrecognized(contract: &str, data: &[u8]) -> Revert {
    format!(
        "{contract}: function selector 0x{} was not recognized",
        hex::encode(&data[..4])
    )
}

fn returns(values: Vec<DynSolValue>) -> Vec<u8> {
    DynSolValue::Tuple(values).abi_encode_params()
}

fn uint(value: U256) -> DynSolValue {
    DynSolValue::Uint(value, 256)
}

fn reserve_data(reserve: &SimReserve) -> Vec<u8> {
    let zero = |bits| DynSolValue::Uint(U256::ZERO, bits);
    returns(vec![DynSolValue::Tuple(vec![
        DynSolValue::Tuple(vec![zero(256)]),
        DynSolValue::Uint(ray(), 128),
        DynSolValue::Uint(ray(), 128),
        zero(128),
        zero(128),
        zero(128),
        zero(40),
        DynSolValue::Address(reserve.a_token),
        DynSolValue::Address(reserve.stable_debt),
        DynSolValue::Address(reserve.variable_debt),
        DynSolValue::Address(reserve.strategy),
        DynSolValue::Uint(U256::from(reserve.id), 8),
    ])])
}

fn decode_params(types: &str, data: &[u8]) -> Result<Vec<DynSolValue>, Revert> {
    let ty = DynSolType::parse(types).map_err(|e| e.to_string())?;
    match ty
        .abi_decode_params(data)
        .map_err(|e| format!("invalid constructor arguments: {e}"))?
    {
        DynSolValue::Tuple(values) => Ok(values),
        value => Ok(vec![value]),
    }
}

fn address_at(values: &[DynSolValue], index: usize) -> Result<Address, Revert> {
    values
        .get(index)
        .and_then(DynSolValue::as_address)
        .ok_or_else(|| format!("argument {index} is not an address"))
}

fn uint_at(values: &[DynSolValue], index: usize) -> Result<U256, Revert> {
    values
        .get(index)
        .and_then(DynSolValue::as_uint)
        .map(|(value, _)| value)
        .ok_or_else(|| format!("argument {index} is not an integer"))
}

fn bytes_at(values: &[DynSolValue], index: usize) -> Result<Vec<u8>, Revert> {
    values
        .get(index)
        .and_then(DynSolValue::as_bytes)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| format!("argument {index} is not a byte string"))
}

fn addresses_at(values: &[DynSolValue], index: usize) -> Result<Vec<Address>, Revert> {
    values
        .get(index)
        .and_then(DynSolValue::as_array)
        .map(|items| items.iter().filter_map(DynSolValue::as_address).collect())
        .ok_or_else(|| format!("argument {index} is not an address array"))
}
