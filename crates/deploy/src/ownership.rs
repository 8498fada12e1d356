//! Handing administrative control from the deployer to its final holders.

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    AddressRegistry,
    abi::{Arg, Bindings, CallSpec, decode_address, selector},
    error::{DeployError, NetworkError},
    network::{Accounts, Network, Receipt, query},
    roles::{RoleAssignment, RoleCheck},
    wirer::ConfigurationWirer,
};

/// A temporary transfer of `target` to `borrower`.
///
/// The borrower runs `calls` while it owns the target, then `hand_back` must
/// leave the target owned by `returns_to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipLoan {
    pub target: String,
    pub borrower: String,
    pub calls: Vec<CallSpec>,
    pub hand_back: CallSpec,
    pub returns_to: Arg,
}

impl OwnershipLoan {
    pub fn references(&self) -> Vec<&str> {
        let mut names = vec![self.target.as_str(), self.borrower.as_str()];
        names.extend(self.calls.iter().flat_map(CallSpec::references));
        names.extend(self.hand_back.references());
        names.extend(self.returns_to.references());
        names
    }
}

pub struct OwnershipHandoff<'a, N> {
    network: &'a N,
    accounts: &'a Accounts,
    wirer: ConfigurationWirer<'a, N>,
}

impl<'a, N: Network> OwnershipHandoff<'a, N> {
    pub fn new(network: &'a N, accounts: &'a Accounts) -> Self {
        Self {
            network,
            accounts,
            wirer: ConfigurationWirer::new(network, accounts),
        }
    }

    pub async fn transfer_ownership(
        &self,
        registry: &AddressRegistry,
        contract: &str,
        new_owner: Arg,
    ) -> Result<Receipt, DeployError> {
        self.hand_off(registry, &RoleAssignment::owner(contract, new_owner))
            .await
    }

    /// Grant a role to its final holder. For ownership this is irreversible
    /// from the deployer's side.
    pub async fn hand_off(
        &self,
        registry: &AddressRegistry,
        assignment: &RoleAssignment,
    ) -> Result<Receipt, DeployError> {
        let receipt = self.wirer.assign(registry, assignment).await?;
        tracing::info!(
            contract = %assignment.target,
            role = %assignment.role,
            grantee = ?assignment.grantee,
            "Handed off"
        );
        Ok(receipt)
    }

    /// Lend `loan.target` to the borrower for a batch of calls.
    ///
    /// The hand-back is sent even when the batch fails, and ownership is
    /// checked on chain afterwards. The first error encountered is returned.
    pub async fn lend(
        &self,
        registry: &AddressRegistry,
        loan: &OwnershipLoan,
    ) -> Result<(), DeployError> {
        self.transfer_ownership(registry, &loan.target, Arg::contract(&loan.borrower))
            .await?;
        tracing::info!(contract = %loan.target, borrower = %loan.borrower, "Ownership lent");

        let mut first_error = None;
        for call in &loan.calls {
            if let Err(e) = self.wirer.apply(registry, call).await {
                tracing::error!(
                    contract = %call.target,
                    method = %call.method,
                    error = %e.chain(),
                    "Call failed during ownership loan, handing back"
                );
                first_error = Some(e);
                break;
            }
        }

        if let Err(e) = self.wirer.apply(registry, &loan.hand_back).await {
            tracing::error!(contract = %loan.target, error = %e.chain(), "Hand-back failed");
            first_error.get_or_insert(e);
        }

        let check = RoleCheck::owner(loan.target.clone(), loan.returns_to.clone());
        match self.verify(registry, &check).await {
            Ok(owner) => {
                tracing::info!(contract = %loan.target, %owner, "Ownership returned");
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Read the current holder of a role and compare it with the expectation.
    pub async fn verify(
        &self,
        registry: &AddressRegistry,
        check: &RoleCheck,
    ) -> Result<Address, DeployError> {
        let getter = check
            .role
            .getter()
            .ok_or_else(|| DeployError::InvalidArguments {
                signature: check.role.setter().to_string(),
                reason: format!("{} cannot be read back", check.role),
            })?;
        let bindings = Bindings {
            registry,
            accounts: self.accounts,
        };
        let expected = match check.expected.bind(&bindings)? {
            Arg::Address(address) => address,
            other => {
                return Err(DeployError::InvalidArguments {
                    signature: getter.to_string(),
                    reason: format!("expected holder is not an address: {other:?}"),
                });
            }
        };

        let raw = query(
            self.network,
            self.accounts.deployer,
            &check.target,
            registry.address(&check.target)?,
            getter,
            selector(getter).to_vec().into(),
        )
        .await?;
        let actual = decode_address(&raw).map_err(|reason| DeployError::Query {
            target: check.target.clone(),
            method: getter.to_string(),
            source: NetworkError::Decode(reason),
        })?;

        if actual != expected {
            return Err(DeployError::OwnershipMismatch {
                target: check.target.clone(),
                expected,
                actual,
            });
        }
        tracing::debug!(contract = %check.target, role = %check.role, holder = %actual, "Role verified");
        Ok(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DeploymentRecord, SimulatedNetwork,
        abi::{encode_constructor, ray_percent},
        contracts::{ILendingRateOracle, ITokensHelper},
        network::DeployTx,
        roles::RoleKind,
    };
    use alloy_core::primitives::Bytes;
    use alloy_sol_types::SolCall;

    async fn deploy(
        network: &SimulatedNetwork,
        registry: &mut AddressRegistry,
        from: Address,
        name: &str,
        args: &[Arg],
    ) -> Address {
        let address = network
            .deploy(DeployTx {
                from,
                contract: name.to_string(),
                bytecode: Bytes::from_static(&[0x60, 0x80]),
                constructor_args: encode_constructor(args).unwrap(),
            })
            .await
            .unwrap()
            .contract_address
            .unwrap();
        registry
            .register(DeploymentRecord::plain(name, name, address))
            .unwrap();
        address
    }

    async fn setup(network: SimulatedNetwork) -> (SimulatedNetwork, Accounts, AddressRegistry) {
        let accounts = Accounts::resolve(&network, None, None).await.unwrap();
        let mut registry = AddressRegistry::default();
        let deployer = accounts.deployer;
        deploy(&network, &mut registry, deployer, "LendingRateOracle", &[]).await;
        // The helper is built with the pool and its addresses provider.
        let helper_args = [
            Arg::Address(Address::repeat_byte(0x0a)),
            Arg::Address(Address::repeat_byte(0x0b)),
        ];
        deploy(&network, &mut registry, deployer, "StableAndVariableTokensHelper", &helper_args)
            .await;
        deploy(&network, &mut registry, deployer, "MockToken", &[Arg::u64(0)]).await;
        (network, accounts, registry)
    }

    fn loan(rate: Arg) -> OwnershipLoan {
        OwnershipLoan {
            target: "LendingRateOracle".into(),
            borrower: "StableAndVariableTokensHelper".into(),
            calls: vec![CallSpec::of::<ITokensHelper::setOracleBorrowRatesCall>(
                "StableAndVariableTokensHelper",
                vec![
                    Arg::contracts(["MockToken"]),
                    Arg::Array(vec![rate]),
                    Arg::contract("LendingRateOracle"),
                ],
            )],
            hand_back: CallSpec::of::<ITokensHelper::setOracleOwnershipCall>(
                "StableAndVariableTokensHelper",
                vec![Arg::contract("LendingRateOracle"), Arg::Deployer],
            ),
            returns_to: Arg::Deployer,
        }
    }

    #[tokio::test]
    async fn test_loan_runs_batch_and_returns_ownership() {
        let (network, accounts, registry) = setup(SimulatedNetwork::new()).await;
        let handoff = OwnershipHandoff::new(&network, &accounts);

        handoff
            .lend(&registry, &loan(Arg::uint(ray_percent(3))))
            .await
            .unwrap();

        let oracle = registry.address("LendingRateOracle").unwrap();
        assert_eq!(network.owner_of(oracle).await, Some(accounts.deployer));

        let raw = network
            .call(crate::network::CallTx {
                from: accounts.deployer,
                to: oracle,
                data: ILendingRateOracle::getMarketBorrowRateCall {
                    asset: registry.address("MockToken").unwrap(),
                }
                .abi_encode()
                .into(),
            })
            .await
            .unwrap();
        let rate = ILendingRateOracle::getMarketBorrowRateCall::abi_decode_returns(&raw, true)
            .unwrap()
            ._0;
        assert_eq!(rate, ray_percent(3));
    }

    #[tokio::test]
    async fn test_failed_batch_still_hands_back() {
        let network = SimulatedNetwork::new()
            .failing_call(ITokensHelper::setOracleBorrowRatesCall::SIGNATURE);
        let (network, accounts, registry) = setup(network).await;
        let handoff = OwnershipHandoff::new(&network, &accounts);

        let err = handoff
            .lend(&registry, &loan(Arg::uint(ray_percent(3))))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, DeployError::ConfigurationCall { method, .. } if method == "setOracleBorrowRates(address[],uint256[],address)"),
            "unexpected error: {err}"
        );

        let oracle = registry.address("LendingRateOracle").unwrap();
        assert_eq!(network.owner_of(oracle).await, Some(accounts.deployer));
        let last = network.transactions().await.pop().unwrap();
        assert_eq!(
            last.selector,
            Some(ITokensHelper::setOracleOwnershipCall::SELECTOR)
        );
        assert!(last.reverted.is_none());
    }

    #[tokio::test]
    async fn test_verify_reports_mismatch() {
        let (network, accounts, registry) = setup(SimulatedNetwork::new()).await;
        let handoff = OwnershipHandoff::new(&network, &accounts);

        handoff
            .transfer_ownership(&registry, "LendingRateOracle", Arg::Treasury)
            .await
            .unwrap();

        let err = handoff
            .verify(&registry, &RoleCheck::owner("LendingRateOracle", Arg::Deployer))
            .await
            .unwrap_err();
        let DeployError::OwnershipMismatch { expected, actual, .. } = err else {
            panic!("expected an ownership mismatch");
        };
        assert_eq!(expected, accounts.deployer);
        assert_eq!(actual, accounts.treasury);

        let owner = handoff
            .verify(&registry, &RoleCheck::owner("LendingRateOracle", Arg::Treasury))
            .await
            .unwrap();
        assert_eq!(owner, accounts.treasury);
    }

    #[tokio::test]
    async fn test_verify_needs_a_getter() {
        let (network, accounts, registry) = setup(SimulatedNetwork::new()).await;
        let handoff = OwnershipHandoff::new(&network, &accounts);

        let check = RoleCheck::new("LendingRateOracle", RoleKind::Minters, Arg::Deployer);
        let err = handoff.verify(&registry, &check).await.unwrap_err();
        assert!(matches!(err, DeployError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_deployer_loses_control_after_handoff() {
        let (network, accounts, registry) = setup(SimulatedNetwork::new()).await;
        let handoff = OwnershipHandoff::new(&network, &accounts);

        handoff
            .transfer_ownership(&registry, "LendingRateOracle", Arg::Treasury)
            .await
            .unwrap();
        let err = handoff
            .transfer_ownership(&registry, "LendingRateOracle", Arg::Deployer)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeployError::ConfigurationCall {
                source: NetworkError::Reverted { .. },
                ..
            }
        ));
    }
}
