//! Deployment stages.
//!
//! The order is fixed. Every step of a plan is tagged with the stage its group
//! completes, so the last stage reached is always known when a run halts.

use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Init,
    RegistriesDeployed,
    CoreLibrariesLinked,
    CoreProxyDeployed,
    HelpersDeployed,
    TokenizationImplsDeployed,
    OraclesWiredAndOwned,
    RewardChainDeployedAndWired,
    ReserveBatchInitialized,
    OwnershipFinalized,
    SmokeTested,
    Done,
}

impl Stage {
    pub fn next(self) -> Option<Self> {
        Some(match self {
            Self::Init => Self::RegistriesDeployed,
            Self::RegistriesDeployed => Self::CoreLibrariesLinked,
            Self::CoreLibrariesLinked => Self::CoreProxyDeployed,
            Self::CoreProxyDeployed => Self::HelpersDeployed,
            Self::HelpersDeployed => Self::TokenizationImplsDeployed,
            Self::TokenizationImplsDeployed => Self::OraclesWiredAndOwned,
            Self::OraclesWiredAndOwned => Self::RewardChainDeployedAndWired,
            Self::RewardChainDeployedAndWired => Self::ReserveBatchInitialized,
            Self::ReserveBatchInitialized => Self::OwnershipFinalized,
            Self::OwnershipFinalized => Self::SmokeTested,
            Self::SmokeTested => Self::Done,
            Self::Done => return None,
        })
    }

    /// Whether plan steps may be tagged with this stage.
    pub fn has_steps(self) -> bool {
        !matches!(self, Self::Init | Self::Done)
    }
}
