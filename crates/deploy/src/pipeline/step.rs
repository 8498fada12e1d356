use serde::{Deserialize, Serialize};

use super::Stage;
use crate::{
    abi::CallSpec,
    deployer::{AdoptSpec, DeploySpec, ProxySettings, ProxySpec},
    ownership::OwnershipLoan,
    reserves::ReserveBatch,
    roles::{RoleAssignment, RoleCheck},
    smoke::SmokeTestSpec,
};

/// One unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Deploy(DeploySpec),
    DeployProxy(ProxySpec),
    AdoptProxy(AdoptSpec),
    Configure(CallSpec),
    Assign(RoleAssignment),
    /// A role assignment meant to be final.
    HandOff(RoleAssignment),
    Borrow(OwnershipLoan),
    InitReserves(ReserveBatch),
    Verify(RoleCheck),
    SmokeTest(SmokeTestSpec),
}

impl Step {
    pub fn describe(&self) -> String {
        match self {
            Self::Deploy(spec) => match &spec.contract {
                Some(contract) => format!("deploy {} ({contract})", spec.name),
                None => format!("deploy {}", spec.name),
            },
            Self::DeployProxy(spec) => {
                format!("deploy {} behind proxy, {}", spec.name, spec.initializer.method)
            }
            Self::AdoptProxy(spec) => format!("adopt {} from {}", spec.name, spec.factory),
            Self::Configure(call) => format!("{}.{}", call.target, call.method),
            Self::Assign(assignment) => {
                format!("assign {} on {}", assignment.role, assignment.target)
            }
            Self::HandOff(assignment) => {
                format!("hand off {} of {}", assignment.role, assignment.target)
            }
            Self::Borrow(loan) => format!("lend {} to {}", loan.target, loan.borrower),
            Self::InitReserves(batch) => format!(
                "initialize {} reserve(s) via {}",
                batch.reserves.len(),
                batch.via
            ),
            Self::Verify(check) => format!("verify {} of {}", check.role, check.target),
            Self::SmokeTest(spec) => format!("smoke test {}", spec.underlying),
        }
    }

    /// Names that must already be registered when the step runs.
    pub fn references<'a>(&'a self, proxy: &'a ProxySettings) -> Vec<&'a str> {
        match self {
            Self::Deploy(spec) => spec.args.iter().flat_map(|arg| arg.references()).collect(),
            Self::DeployProxy(spec) => std::iter::once(proxy.admin.as_str())
                .chain(spec.args.iter().flat_map(|arg| arg.references()))
                .chain(spec.initializer.args.iter().flat_map(|arg| arg.references()))
                .collect(),
            Self::AdoptProxy(spec) => vec![spec.factory.as_str(), spec.implementation.as_str()],
            Self::Configure(call) => call.references(),
            Self::Assign(assignment) | Self::HandOff(assignment) => assignment.references(),
            Self::Borrow(loan) => loan.references(),
            Self::InitReserves(batch) => batch.references(),
            Self::Verify(check) => std::iter::once(check.target.as_str())
                .chain(check.expected.references())
                .collect(),
            Self::SmokeTest(spec) => spec.references().to_vec(),
        }
    }

    /// Names the step registers, in registration order.
    pub fn registers(&self) -> Vec<String> {
        match self {
            Self::Deploy(spec) => vec![spec.name.clone()],
            Self::DeployProxy(spec) => vec![spec.implementation_name(), spec.name.clone()],
            Self::AdoptProxy(spec) => vec![spec.name.clone()],
            _ => Vec::new(),
        }
    }

    /// Contracts on which the step needs the deployer's privileges.
    pub fn privileged_targets(&self) -> Vec<&str> {
        match self {
            Self::Configure(call) => vec![call.target.as_str()],
            Self::Assign(assignment) | Self::HandOff(assignment) => {
                vec![assignment.target.as_str()]
            }
            Self::Borrow(loan) => std::iter::once(loan.target.as_str())
                .chain(loan.calls.iter().map(|call| call.target.as_str()))
                .chain(std::iter::once(loan.hand_back.target.as_str()))
                .collect(),
            Self::InitReserves(batch) => vec![batch.via.as_str()],
            _ => Vec::new(),
        }
    }

    /// The contract whose ownership the deployer gives up, if any.
    pub fn revokes(&self) -> Option<&str> {
        match self {
            Self::Assign(assignment) | Self::HandOff(assignment)
                if assignment.role.revokes_deployer() =>
            {
                Some(assignment.target.as_str())
            }
            _ => None,
        }
    }
}

/// A step tagged with the stage it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub stage: Stage,
    pub label: String,
    #[serde(flatten)]
    pub step: Step,
}
