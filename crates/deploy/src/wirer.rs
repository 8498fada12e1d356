//! Post-deployment configuration calls.

use alloy_core::primitives::{Address, Bytes};
use alloy_sol_types::SolCall;

use crate::{
    AddressRegistry,
    abi::{Bindings, CallSpec},
    contracts::{IERC20Mintable, IReserveInitializer, InitReserveInput},
    error::{DeployError, NetworkError},
    network::{Accounts, CallTx, Network, Receipt, query},
    reserves::ReserveBatch,
    roles::RoleAssignment,
};

pub struct ConfigurationWirer<'a, N> {
    network: &'a N,
    accounts: &'a Accounts,
}

impl<'a, N: Network> ConfigurationWirer<'a, N> {
    pub fn new(network: &'a N, accounts: &'a Accounts) -> Self {
        Self { network, accounts }
    }

    /// Send `call` from the deployer and wait for its receipt.
    pub async fn apply(
        &self,
        registry: &AddressRegistry,
        call: &CallSpec,
    ) -> Result<Receipt, DeployError> {
        self.apply_as(registry, self.accounts.deployer, call).await
    }

    /// Send `call` from an arbitrary sender.
    pub(crate) async fn apply_as(
        &self,
        registry: &AddressRegistry,
        from: Address,
        call: &CallSpec,
    ) -> Result<Receipt, DeployError> {
        let bindings = Bindings {
            registry,
            accounts: self.accounts,
        };
        let (to, data) = call.encode(&bindings)?;
        self.submit(from, &call.target, &call.method, to, data).await
    }

    pub async fn assign(
        &self,
        registry: &AddressRegistry,
        assignment: &RoleAssignment,
    ) -> Result<Receipt, DeployError> {
        tracing::info!(
            contract = %assignment.target,
            role = %assignment.role,
            "Assigning role..."
        );
        self.apply(registry, &assignment.to_call()).await
    }

    /// Read each underlying's name and send one `batchInitReserve`.
    pub async fn init_reserves(
        &self,
        registry: &AddressRegistry,
        batch: &ReserveBatch,
    ) -> Result<Receipt, DeployError> {
        let mut input: Vec<InitReserveInput> = Vec::with_capacity(batch.reserves.len());
        for reserve in &batch.reserves {
            let name = self.token_name(registry, &reserve.underlying_asset).await?;
            input.push(reserve.bind(registry, name)?.into());
        }

        let to = registry.address(&batch.via)?;
        let data = IReserveInitializer::batchInitReserveCall { input }.abi_encode();
        tracing::info!(via = %batch.via, reserves = batch.reserves.len(), "Initializing reserves...");
        self.submit(
            self.accounts.deployer,
            &batch.via,
            IReserveInitializer::batchInitReserveCall::SIGNATURE,
            to,
            data.into(),
        )
        .await
    }

    async fn token_name(
        &self,
        registry: &AddressRegistry,
        token: &str,
    ) -> Result<String, DeployError> {
        let method = IERC20Mintable::nameCall::SIGNATURE;
        let raw = query(
            self.network,
            self.accounts.deployer,
            token,
            registry.address(token)?,
            method,
            IERC20Mintable::nameCall {}.abi_encode().into(),
        )
        .await?;
        IERC20Mintable::nameCall::abi_decode_returns(&raw, true)
            .map(|ret| ret._0)
            .map_err(|e| DeployError::Query {
                target: token.to_string(),
                method: method.to_string(),
                source: NetworkError::Decode(e.to_string()),
            })
    }

    pub(crate) async fn submit(
        &self,
        from: Address,
        target: &str,
        method: &str,
        to: Address,
        data: Bytes,
    ) -> Result<Receipt, DeployError> {
        tracing::debug!(contract = target, method, %from, %to, "Sending configuration call...");
        let receipt = self
            .network
            .send(CallTx { from, to, data })
            .await
            .map_err(|source| DeployError::ConfigurationCall {
                target: target.to_string(),
                method: method.to_string(),
                source,
            })?;
        tracing::info!(contract = target, method, tx_hash = %receipt.tx_hash, "Configuration call confirmed");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abi::Arg,
        contracts::IAddressesProviderRegistry,
        network::DeployTx,
        roles::RoleKind,
        DeploymentRecord, SimulatedNetwork,
    };

    async fn deploy(network: &SimulatedNetwork, from: Address, contract: &str) -> Address {
        network
            .deploy(DeployTx {
                from,
                contract: contract.to_string(),
                bytecode: Bytes::from_static(&[0x60, 0x80]),
                constructor_args: Bytes::new(),
            })
            .await
            .unwrap()
            .contract_address
            .unwrap()
    }

    async fn setup() -> (SimulatedNetwork, Accounts, AddressRegistry) {
        let network = SimulatedNetwork::new();
        let accounts = Accounts::resolve(&network, None, None).await.unwrap();
        let mut registry = AddressRegistry::default();
        for contract in [
            "LendingPoolAddressesProviderRegistry",
            "LendingPoolAddressesProvider",
        ] {
            let address = deploy(&network, accounts.deployer, contract).await;
            registry
                .register(DeploymentRecord::plain(contract, contract, address))
                .unwrap();
        }
        (network, accounts, registry)
    }

    #[tokio::test]
    async fn test_apply_registers_provider() {
        let (network, accounts, registry) = setup().await;
        let wirer = ConfigurationWirer::new(&network, &accounts);

        let call = CallSpec::of::<IAddressesProviderRegistry::registerAddressesProviderCall>(
            "LendingPoolAddressesProviderRegistry",
            vec![Arg::contract("LendingPoolAddressesProvider"), Arg::u64(1)],
        );
        let receipt = wirer.apply(&registry, &call).await.unwrap();
        assert!(receipt.contract_address.is_none());
    }

    #[tokio::test]
    async fn test_revert_reason_is_surfaced() {
        let (network, accounts, registry) = setup().await;
        let wirer = ConfigurationWirer::new(&network, &accounts);

        let call = CallSpec::of::<IAddressesProviderRegistry::registerAddressesProviderCall>(
            "LendingPoolAddressesProviderRegistry",
            vec![Arg::contract("LendingPoolAddressesProvider"), Arg::u64(0)],
        );
        let err = wirer.apply(&registry, &call).await.unwrap_err();
        let DeployError::ConfigurationCall { target, method, source } = err else {
            panic!("expected a configuration call error");
        };
        assert_eq!(target, "LendingPoolAddressesProviderRegistry");
        assert_eq!(method, "registerAddressesProvider(address,uint256)");
        assert!(matches!(source, NetworkError::Reverted { .. }));
    }

    #[tokio::test]
    async fn test_assign_roles() {
        let (network, accounts, registry) = setup().await;
        let wirer = ConfigurationWirer::new(&network, &accounts);

        for (role, grantee) in [
            (RoleKind::PoolAdmin, Arg::Deployer),
            (RoleKind::EmergencyAdmin, Arg::Deployer),
            (RoleKind::LiquidationFeeRecipient, Arg::Treasury),
        ] {
            wirer
                .assign(
                    &registry,
                    &RoleAssignment::new("LendingPoolAddressesProvider", role, grantee),
                )
                .await
                .unwrap();
        }
        assert_eq!(network.transactions().await.len(), 5);
    }

    #[tokio::test]
    async fn test_arguments_are_checked_before_sending() {
        let (network, accounts, registry) = setup().await;
        let wirer = ConfigurationWirer::new(&network, &accounts);

        let call = CallSpec::new(
            "LendingPoolAddressesProvider",
            "setPoolAdmin(address)",
            vec![Arg::u64(7)],
        );
        let err = wirer.apply(&registry, &call).await.unwrap_err();
        assert!(matches!(err, DeployError::InvalidArguments { .. }));
        assert_eq!(network.transactions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_target() {
        let (network, accounts, registry) = setup().await;
        let wirer = ConfigurationWirer::new(&network, &accounts);

        let call = CallSpec::new("AaveOracle", "setAssetSources(address[],address[])", vec![]);
        let err = wirer.apply(&registry, &call).await.unwrap_err();
        assert!(matches!(err, DeployError::UnknownName(name) if name == "AaveOracle"));
    }
}
