//! poolforge-deploy - Deployment orchestration for an Aave-style lending market.
//!
//! This crate deploys the market's contracts and its reward and fee-distribution
//! chain in dependency order, wires them together, hands privileged roles over
//! to their final owners and finishes with a smoke test of the new market.
//!
//! The work is described as a [`Plan`] of stage-tagged steps and executed by an
//! [`Orchestrator`] against any [`Network`]: a JSON-RPC node in production or
//! the in-process [`SimulatedNetwork`] for dry runs and tests.

pub mod abi;
pub mod artifacts;
pub mod config;
pub mod contracts;
mod deployer;
mod error;
mod linker;
pub mod network;
mod ownership;
mod pipeline;
mod registry;
pub mod report;
mod reserves;
mod roles;
mod smoke;
mod wirer;

pub use abi::{Arg, CallSpec};
pub use artifacts::{Artifact, ArtifactStore};
pub use config::{CONFIG_FILENAME, DeployConfig, NetworkConfig};
pub use deployer::{
    AdoptSpec, DeploySpec, Deployer, IMPLEMENTATION_SUFFIX, InitializerSpec, ProxySettings,
    ProxySpec,
};
pub use error::{DeployError, NetworkError};
pub use linker::{LibraryLinker, LinkedBytecode};
pub use network::{
    Accounts, JsonRpcNetwork, JsonRpcNetworkConfig, Network, SimTransaction, SimulatedNetwork,
};
pub use ownership::{OwnershipHandoff, OwnershipLoan};
pub use pipeline::{
    DeployContext, DeploymentOutcome, FailedStep, InterestRateConfig, MarketConfig,
    OrchestrationFailure, Orchestrator, Plan, PlanBuilder, PlannedStep, ReserveConfig,
    RewardsConfig, Stage, Step, lending_market,
};
pub use registry::{
    AddressRegistry, DeploymentKind, DeploymentRecord, InitializerCall, ProxyDeployment,
};
pub use report::{DeploymentReport, DeploymentStatus};
pub use reserves::{ReserveBatch, ReserveInitParams, ReserveInitSpec, ReserveTokenNames};
pub use roles::{RoleAssignment, RoleCheck, RoleKind};
pub use smoke::{SmokeTest, SmokeTestReport, SmokeTestSpec};
pub use wirer::ConfigurationWirer;
