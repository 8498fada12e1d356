//! End-to-end exercise of a freshly deployed market: deposits and a flash
//! loan against the first reserve.

use alloy_core::primitives::{Address, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::{
    AddressRegistry,
    abi::{Arg, CallSpec, ether},
    contracts::{IERC20Mintable, IFlashLoanConsumer, ILendingPool},
    error::{DeployError, NetworkError},
    network::{Accounts, Network, query},
    wirer::ConfigurationWirer,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeTestSpec {
    /// Underlying token of the reserve under test.
    pub underlying: String,
    pub pool: String,
    pub flash_loan_consumer: String,
    pub deposit_amount: U256,
    pub deposit_rounds: u32,
    pub flash_loan_amount: U256,
}

impl Default for SmokeTestSpec {
    fn default() -> Self {
        Self {
            underlying: "AMockToken".to_string(),
            pool: "LendingPool".to_string(),
            flash_loan_consumer: "MockFlashLoan".to_string(),
            deposit_amount: ether(1000),
            deposit_rounds: 2,
            flash_loan_amount: ether(1000),
        }
    }
}

impl SmokeTestSpec {
    pub fn references(&self) -> [&str; 3] {
        [&self.underlying, &self.pool, &self.flash_loan_consumer]
    }

    /// How much the reserve must grow over all deposit rounds.
    pub fn expected_growth(&self) -> Result<U256, DeployError> {
        self.deposit_amount
            .checked_mul(U256::from(self.deposit_rounds))
            .ok_or_else(|| DeployError::SmokeTest {
                action: "deposit".to_string(),
                reason: "total deposit overflows uint256".to_string(),
            })
    }
}

/// Balances observed during a smoke test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmokeTestReport {
    /// aToken holding the reserve's liquidity.
    pub reserve_token: Address,
    pub reserve_before: U256,
    pub reserve_after: U256,
    pub deposited: U256,
    pub flash_loan_before: U256,
    pub flash_loan_after: U256,
}

pub struct SmokeTest<'a, N> {
    network: &'a N,
    accounts: &'a Accounts,
    wirer: ConfigurationWirer<'a, N>,
}

impl<'a, N: Network> SmokeTest<'a, N> {
    pub fn new(network: &'a N, accounts: &'a Accounts) -> Self {
        Self {
            network,
            accounts,
            wirer: ConfigurationWirer::new(network, accounts),
        }
    }

    pub async fn run(
        &self,
        registry: &AddressRegistry,
        spec: &SmokeTestSpec,
    ) -> Result<SmokeTestReport, DeployError> {
        let expected = spec.expected_growth()?;
        let underlying = registry.address(&spec.underlying)?;

        let reserve = self
            .read(
                registry,
                &spec.pool,
                ILendingPool::getReserveDataCall { asset: underlying },
            )
            .await?
            ._0;
        let reserve_token = reserve.aTokenAddress;
        if reserve_token.is_zero() {
            return Err(DeployError::SmokeTest {
                action: "getReserveData".to_string(),
                reason: format!("{} has no initialized reserve", spec.underlying),
            });
        }

        let reserve_before = self.balance(registry, &spec.underlying, reserve_token).await?;
        tracing::info!(%reserve_token, balance = %reserve_before, "Reserve balance before deposits");

        for round in 1..=spec.deposit_rounds {
            let amount = Arg::uint(spec.deposit_amount);
            let calls = [
                CallSpec::of::<IERC20Mintable::mintCall>(
                    spec.underlying.clone(),
                    vec![Arg::Deployer, amount.clone()],
                ),
                CallSpec::of::<IERC20Mintable::approveCall>(
                    spec.underlying.clone(),
                    vec![Arg::contract(&spec.pool), amount.clone()],
                ),
                CallSpec::of::<ILendingPool::depositCall>(
                    spec.pool.clone(),
                    vec![
                        Arg::contract(&spec.underlying),
                        amount,
                        Arg::Deployer,
                        Arg::Uint {
                            value: U256::ZERO,
                            bits: 16,
                        },
                    ],
                ),
            ];
            for call in &calls {
                self.wirer.apply(registry, call).await?;
            }
            tracing::info!(round, amount = %spec.deposit_amount, "Deposited");
        }

        let reserve_after = self.balance(registry, &spec.underlying, reserve_token).await?;
        let deposited = reserve_after.saturating_sub(reserve_before);
        if deposited != expected {
            return Err(DeployError::SmokeTest {
                action: "deposit".to_string(),
                reason: format!("reserve grew by {deposited}, expected {expected}"),
            });
        }
        tracing::info!(balance = %reserve_after, %deposited, "Reserve balance after deposits");

        let consumer = registry.address(&spec.flash_loan_consumer)?;
        self.wirer
            .apply(
                registry,
                &CallSpec::of::<IERC20Mintable::mintCall>(
                    spec.underlying.clone(),
                    vec![
                        Arg::Address(consumer),
                        Arg::uint(spec.flash_loan_amount),
                    ],
                ),
            )
            .await?;

        let flash_loan_before = self.balance(registry, &spec.underlying, consumer).await?;
        tracing::info!(balance = %flash_loan_before, "Before flash loan");

        self.wirer
            .apply(
                registry,
                &CallSpec::of::<IFlashLoanConsumer::flashLoanCallCall>(
                    spec.flash_loan_consumer.clone(),
                    vec![
                        Arg::contracts([spec.underlying.as_str()]),
                        Arg::Array(vec![Arg::uint(spec.flash_loan_amount)]),
                    ],
                ),
            )
            .await?;

        let flash_loan_after = self.balance(registry, &spec.underlying, consumer).await?;
        tracing::info!(
            balance = %flash_loan_after,
            premium = %flash_loan_before.saturating_sub(flash_loan_after),
            "After flash loan"
        );

        Ok(SmokeTestReport {
            reserve_token,
            reserve_before,
            reserve_after,
            deposited,
            flash_loan_before,
            flash_loan_after,
        })
    }

    async fn balance(
        &self,
        registry: &AddressRegistry,
        token: &str,
        holder: Address,
    ) -> Result<U256, DeployError> {
        Ok(self
            .read(registry, token, IERC20Mintable::balanceOfCall { account: holder })
            .await?
            ._0)
    }

    async fn read<C: SolCall>(
        &self,
        registry: &AddressRegistry,
        target: &str,
        call: C,
    ) -> Result<C::Return, DeployError> {
        let raw = query(
            self.network,
            self.accounts.deployer,
            target,
            registry.address(target)?,
            C::SIGNATURE,
            call.abi_encode().into(),
        )
        .await?;
        C::abi_decode_returns(&raw, true).map_err(|e| DeployError::Query {
            target: target.to_string(),
            method: C::SIGNATURE.to_string(),
            source: NetworkError::Decode(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec() {
        let spec = SmokeTestSpec::default();
        assert_eq!(spec.expected_growth().unwrap(), ether(2000));
        assert_eq!(spec.references(), ["AMockToken", "LendingPool", "MockFlashLoan"]);
    }

    #[test]
    fn test_expected_growth_overflow() {
        let spec = SmokeTestSpec {
            deposit_amount: U256::MAX,
            ..Default::default()
        };
        assert!(matches!(
            spec.expected_growth(),
            Err(DeployError::SmokeTest { .. })
        ));
    }

    #[test]
    fn test_zero_rounds_expects_no_growth() {
        let spec = SmokeTestSpec {
            deposit_rounds: 0,
            ..Default::default()
        };
        assert_eq!(spec.expected_growth().unwrap(), U256::ZERO);
    }
}
