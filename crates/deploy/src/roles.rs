//! Administrative roles and who holds them.

use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::{
    abi::{Arg, CallSpec},
    contracts::{IAddressesProvider, IMultiFeeDistribution, IOwnable, IRewardEligibleDataProvider},
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RoleKind {
    /// `Ownable` owner of any contract.
    Owner,
    PoolAdmin,
    EmergencyAdmin,
    LiquidationFeeRecipient,
    PriceOracle,
    LendingRateOracle,
    /// Minter list of a fee distribution. The grantee is an address array.
    Minters,
    IncentivesController,
}

impl RoleKind {
    /// Signature of the call that grants the role.
    pub fn setter(self) -> &'static str {
        match self {
            Self::Owner => IOwnable::transferOwnershipCall::SIGNATURE,
            Self::PoolAdmin => IAddressesProvider::setPoolAdminCall::SIGNATURE,
            Self::EmergencyAdmin => IAddressesProvider::setEmergencyAdminCall::SIGNATURE,
            Self::LiquidationFeeRecipient => IAddressesProvider::setLiquidationFeeToCall::SIGNATURE,
            Self::PriceOracle => IAddressesProvider::setPriceOracleCall::SIGNATURE,
            Self::LendingRateOracle => IAddressesProvider::setLendingRateOracleCall::SIGNATURE,
            Self::Minters => IMultiFeeDistribution::setMintersCall::SIGNATURE,
            Self::IncentivesController => {
                IRewardEligibleDataProvider::setChefIncentivesControllerCall::SIGNATURE
            }
        }
    }

    /// Signature of a parameterless getter returning the holder, if the
    /// contract exposes one.
    pub fn getter(self) -> Option<&'static str> {
        match self {
            Self::Owner => Some(IOwnable::ownerCall::SIGNATURE),
            Self::PoolAdmin => Some(IAddressesProvider::getPoolAdminCall::SIGNATURE),
            Self::EmergencyAdmin => Some(IAddressesProvider::getEmergencyAdminCall::SIGNATURE),
            Self::PriceOracle => Some(IAddressesProvider::getPriceOracleCall::SIGNATURE),
            Self::LendingRateOracle => Some(IAddressesProvider::getLendingRateOracleCall::SIGNATURE),
            Self::LiquidationFeeRecipient | Self::Minters | Self::IncentivesController => None,
        }
    }

    /// Whether granting this role gives up the deployer's own control of the
    /// target.
    pub fn revokes_deployer(self) -> bool {
        matches!(self, Self::Owner)
    }
}

/// Grant `role` on `target` to `grantee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub target: String,
    pub role: RoleKind,
    pub grantee: Arg,
}

impl RoleAssignment {
    pub fn new(target: impl Into<String>, role: RoleKind, grantee: Arg) -> Self {
        Self {
            target: target.into(),
            role,
            grantee,
        }
    }

    /// Transfer `Ownable` ownership of `target`.
    pub fn owner(target: impl Into<String>, new_owner: Arg) -> Self {
        Self::new(target, RoleKind::Owner, new_owner)
    }

    pub fn to_call(&self) -> CallSpec {
        CallSpec::new(
            self.target.clone(),
            self.role.setter(),
            vec![self.grantee.clone()],
        )
    }

    pub fn references(&self) -> Vec<&str> {
        std::iter::once(self.target.as_str())
            .chain(self.grantee.references())
            .collect()
    }
}

/// Expect `expected` to hold `role` on `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCheck {
    pub target: String,
    pub role: RoleKind,
    pub expected: Arg,
}

impl RoleCheck {
    pub fn new(target: impl Into<String>, role: RoleKind, expected: Arg) -> Self {
        Self {
            target: target.into(),
            role,
            expected,
        }
    }

    pub fn owner(target: impl Into<String>, expected: Arg) -> Self {
        Self::new(target, RoleKind::Owner, expected)
    }
}

impl From<&RoleAssignment> for RoleCheck {
    fn from(assignment: &RoleAssignment) -> Self {
        Self::new(
            assignment.target.clone(),
            assignment.role,
            assignment.grantee.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_setters_are_single_argument() {
        for role in RoleKind::iter() {
            let setter = role.setter();
            assert!(!setter.contains(','), "{role} setter takes one argument: {setter}");
            assert!(!setter.ends_with("()"), "{role} setter takes one argument: {setter}");
        }
        assert_eq!(RoleKind::Minters.setter(), "setMinters(address[])");
        assert_eq!(RoleKind::Owner.setter(), "transferOwnership(address)");
    }

    #[test]
    fn test_only_owner_revokes() {
        let revoking: Vec<_> = RoleKind::iter().filter(|r| r.revokes_deployer()).collect();
        assert_eq!(revoking, vec![RoleKind::Owner]);
    }

    #[test]
    fn test_assignment_call() {
        let assignment = RoleAssignment::new(
            "LendingPoolAddressesProvider",
            RoleKind::PriceOracle,
            Arg::contract("AaveOracle"),
        );
        let call = assignment.to_call();
        assert_eq!(call.method, "setPriceOracle(address)");
        assert_eq!(
            call.references(),
            vec!["LendingPoolAddressesProvider", "AaveOracle"]
        );
        assert_eq!(RoleCheck::from(&assignment).expected, Arg::contract("AaveOracle"));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(RoleKind::LiquidationFeeRecipient.to_string(), "liquidation_fee_recipient");
    }
}
