//! Reserve batch-initialization records.

use alloy_core::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::{AddressRegistry, contracts::InitReserveInput, error::DeployError};

/// Token names and symbols given to the reserve's aToken and debt tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveTokenNames {
    pub a_token_name: String,
    pub a_token_symbol: String,
    pub variable_debt_token_name: String,
    pub variable_debt_token_symbol: String,
    pub stable_debt_token_name: String,
    pub stable_debt_token_symbol: String,
}

impl ReserveTokenNames {
    /// The same name and symbol for all three tokens.
    pub fn uniform(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        let name = name.into();
        let symbol = symbol.into();
        Self {
            a_token_name: name.clone(),
            a_token_symbol: symbol.clone(),
            variable_debt_token_name: name.clone(),
            variable_debt_token_symbol: symbol.clone(),
            stable_debt_token_name: name,
            stable_debt_token_symbol: symbol,
        }
    }
}

/// One reserve, with contracts named by their logical names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveInitSpec {
    pub a_token_impl: String,
    pub stable_debt_token_impl: String,
    pub variable_debt_token_impl: String,
    pub underlying_asset_decimals: u8,
    pub interest_rate_strategy: String,
    pub underlying_asset: String,
    pub treasury: String,
    pub incentives_controller: String,
    pub alloc_point: U256,
    #[serde(flatten)]
    pub names: ReserveTokenNames,
    pub params: Bytes,
}

impl ReserveInitSpec {
    pub fn references(&self) -> [&str; 7] {
        [
            &self.a_token_impl,
            &self.stable_debt_token_impl,
            &self.variable_debt_token_impl,
            &self.interest_rate_strategy,
            &self.underlying_asset,
            &self.treasury,
            &self.incentives_controller,
        ]
    }

    /// Resolve every contract name. The underlying's on-chain name is read
    /// separately and supplied here.
    pub fn bind(
        &self,
        registry: &AddressRegistry,
        underlying_asset_name: String,
    ) -> Result<ReserveInitParams, DeployError> {
        Ok(ReserveInitParams {
            a_token_impl: registry.address(&self.a_token_impl)?,
            stable_debt_token_impl: registry.address(&self.stable_debt_token_impl)?,
            variable_debt_token_impl: registry.address(&self.variable_debt_token_impl)?,
            underlying_asset_decimals: self.underlying_asset_decimals,
            interest_rate_strategy: registry.address(&self.interest_rate_strategy)?,
            underlying_asset: registry.address(&self.underlying_asset)?,
            treasury: registry.address(&self.treasury)?,
            incentives_controller: registry.address(&self.incentives_controller)?,
            alloc_point: self.alloc_point,
            underlying_asset_name,
            names: self.names.clone(),
            params: self.params.clone(),
        })
    }
}

/// One reserve, bound to concrete addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveInitParams {
    pub a_token_impl: Address,
    pub stable_debt_token_impl: Address,
    pub variable_debt_token_impl: Address,
    pub underlying_asset_decimals: u8,
    pub interest_rate_strategy: Address,
    pub underlying_asset: Address,
    pub treasury: Address,
    pub incentives_controller: Address,
    pub alloc_point: U256,
    pub underlying_asset_name: String,
    #[serde(flatten)]
    pub names: ReserveTokenNames,
    pub params: Bytes,
}

impl From<ReserveInitParams> for InitReserveInput {
    fn from(params: ReserveInitParams) -> Self {
        Self {
            aTokenImpl: params.a_token_impl,
            stableDebtTokenImpl: params.stable_debt_token_impl,
            variableDebtTokenImpl: params.variable_debt_token_impl,
            underlyingAssetDecimals: params.underlying_asset_decimals,
            interestRateStrategyAddress: params.interest_rate_strategy,
            underlyingAsset: params.underlying_asset,
            treasury: params.treasury,
            incentivesController: params.incentives_controller,
            allocPoint: params.alloc_point,
            underlyingAssetName: params.underlying_asset_name,
            aTokenName: params.names.a_token_name,
            aTokenSymbol: params.names.a_token_symbol,
            variableDebtTokenName: params.names.variable_debt_token_name,
            variableDebtTokenSymbol: params.names.variable_debt_token_symbol,
            stableDebtTokenName: params.names.stable_debt_token_name,
            stableDebtTokenSymbol: params.names.stable_debt_token_symbol,
            params: params.params,
        }
    }
}

/// Reserves initialized together through `via`, a contract exposing
/// `batchInitReserve`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveBatch {
    pub via: String,
    pub reserves: Vec<ReserveInitSpec>,
}

impl ReserveBatch {
    pub fn references(&self) -> Vec<&str> {
        std::iter::once(self.via.as_str())
            .chain(self.reserves.iter().flat_map(ReserveInitSpec::references))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeploymentRecord;

    fn spec() -> ReserveInitSpec {
        ReserveInitSpec {
            a_token_impl: "AaveAToken".into(),
            stable_debt_token_impl: "StableDebtToken".into(),
            variable_debt_token_impl: "VariableDebtToken".into(),
            underlying_asset_decimals: 8,
            interest_rate_strategy: "DefaultReserveInterestRateStrategy".into(),
            underlying_asset: "AMockToken".into(),
            treasury: "MiddleFeeDistribution".into(),
            incentives_controller: "ChefIncentivesController".into(),
            alloc_point: U256::from(100u64),
            names: ReserveTokenNames::uniform("Shyft Aave interest bearing token", "SAToken"),
            params: Bytes::from_static(&[0x10]),
        }
    }

    #[test]
    fn test_bind_resolves_every_contract() {
        let spec = spec();
        let mut registry = AddressRegistry::default();
        for (i, name) in spec.references().into_iter().enumerate() {
            registry
                .register(DeploymentRecord::plain(
                    name,
                    name,
                    Address::with_last_byte(i as u8 + 1),
                ))
                .unwrap();
        }

        let input: InitReserveInput = spec.bind(&registry, "Mock Token".into()).unwrap().into();
        assert_eq!(input.aTokenImpl, Address::with_last_byte(1));
        assert_eq!(input.underlyingAsset, Address::with_last_byte(5));
        assert_eq!(input.treasury, Address::with_last_byte(6));
        assert_eq!(input.underlyingAssetDecimals, 8);
        assert_eq!(input.underlyingAssetName, "Mock Token");
        assert_eq!(input.stableDebtTokenSymbol, "SAToken");
        assert_eq!(input.params.to_vec(), vec![0x10]);
    }

    #[test]
    fn test_bind_requires_registered_contracts() {
        let err = spec()
            .bind(&AddressRegistry::default(), String::new())
            .unwrap_err();
        assert!(matches!(err, DeployError::UnknownName(name) if name == "AaveAToken"));
    }
}
