//! Declarative deployment plans and the orchestrator that runs them.
//!
//! A [`Plan`] is an ordered list of typed steps, each tagged with the
//! [`Stage`] its group completes. Plans are checked statically before any
//! transaction is sent, then executed strictly in order.
//!
//! # Example
//!
//! ```no_run
//! use poolforge_deploy::{
//!     MarketConfig, Orchestrator, ProxySettings, SimulatedNetwork, SmokeTestSpec, lending_market,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let proxy = ProxySettings::default();
//! let plan = lending_market(&MarketConfig::default(), &SmokeTestSpec::default());
//! let artifacts = plan.placeholder_artifacts(&proxy);
//!
//! let outcome = Orchestrator::new(SimulatedNetwork::new(), artifacts, proxy)
//!     .run(&plan)
//!     .await?;
//! println!("{} contracts deployed", outcome.registry.len());
//! # Ok(())
//! # }
//! ```

mod context;
mod runner;
mod stages;
mod standard;
mod step;

pub use context::DeployContext;
pub use runner::{DeploymentOutcome, FailedStep, OrchestrationFailure, Orchestrator};
pub use stages::Stage;
pub use standard::{
    InterestRateConfig, MarketConfig, ReserveConfig, RewardsConfig, lending_market,
};
pub use step::{PlannedStep, Step};

use std::collections::{BTreeMap, BTreeSet, HashSet};

use derive_more::Deref;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    ArtifactStore,
    deployer::{AdoptSpec, DeploySpec, ProxySettings, ProxySpec},
    error::DeployError,
};

/// An ordered deployment plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Deref)]
pub struct Plan {
    #[deref]
    steps: Vec<PlannedStep>,
}

impl Plan {
    pub fn builder() -> PlanBuilder {
        PlanBuilder::default()
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    /// Check the plan before running it.
    ///
    /// Rejects plans whose stages skip or go backwards, steps that use a name
    /// before it is registered or register it twice, libraries linked before
    /// they are deployed, checks on roles that cannot be read back, and
    /// privileged steps against a contract whose ownership was already handed
    /// off.
    pub fn validate(&self, proxy: &ProxySettings) -> Result<(), DeployError> {
        let mut stage = Stage::Init;
        let mut registered: HashSet<String> = HashSet::new();
        let mut handed_off: BTreeMap<&str, usize> = BTreeMap::new();

        for (index, planned) in self.steps.iter().enumerate() {
            let order = |reason: String| DeployError::PlanOrder {
                index,
                label: planned.label.clone(),
                reason,
            };

            if !planned.stage.has_steps() {
                return Err(order(format!("steps cannot be tagged {}", planned.stage)));
            }
            if planned.stage != stage {
                if stage.next() != Some(planned.stage) {
                    return Err(order(format!(
                        "stage {} cannot follow {stage}",
                        planned.stage
                    )));
                }
                stage = planned.stage;
            }

            if let Step::Deploy(spec) = &planned.step {
                for library in &spec.libraries {
                    if !registered.contains(library) {
                        return Err(DeployError::UnresolvedLibrary {
                            contract: spec.name.clone(),
                            library: library.clone(),
                        });
                    }
                }
            }
            if let Step::Verify(check) = &planned.step {
                if check.role.getter().is_none() {
                    return Err(order(format!("{} cannot be read back", check.role)));
                }
            }

            for name in planned.step.references(proxy) {
                if !registered.contains(name) {
                    return Err(order(format!("{name} is used before it is deployed")));
                }
            }

            for target in planned.step.privileged_targets() {
                if let Some(at) = handed_off.get(target) {
                    return Err(order(format!(
                        "{target} is no longer owned by the deployer (handed off at step {at})"
                    )));
                }
            }
            if let Some(target) = planned.step.revokes() {
                handed_off.insert(target, index);
            }

            for name in planned.step.registers() {
                if !registered.insert(name.clone()) {
                    return Err(DeployError::DuplicateName(name));
                }
            }
        }

        if stage != Stage::SmokeTested {
            return Err(DeployError::PlanOrder {
                index: self.steps.len(),
                label: "end of plan".to_string(),
                reason: format!("plan stops at {stage} instead of {}", Stage::SmokeTested),
            });
        }
        Ok(())
    }

    /// Every artifact the plan deploys, with the libraries it links.
    pub fn contracts(&self, proxy: &ProxySettings) -> BTreeMap<String, BTreeSet<String>> {
        let mut contracts: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for planned in &self.steps {
            match &planned.step {
                Step::Deploy(spec) => {
                    contracts
                        .entry(spec.artifact().to_string())
                        .or_default()
                        .extend(spec.libraries.iter().cloned());
                }
                Step::DeployProxy(spec) => {
                    contracts.entry(spec.artifact().to_string()).or_default();
                    contracts.entry(proxy.contract.clone()).or_default();
                }
                _ => {}
            }
        }
        contracts
    }

    /// Placeholder artifacts for every contract the plan deploys, for runs
    /// against the simulator.
    pub fn placeholder_artifacts(&self, proxy: &ProxySettings) -> ArtifactStore {
        let contracts = self.contracts(proxy);
        ArtifactStore::placeholders(contracts.iter().map(|(contract, libraries)| {
            (
                contract.as_str(),
                libraries.iter().map(String::as_str).collect(),
            )
        }))
    }

    /// SHA-256 of the serialized plan, hex encoded.
    pub fn fingerprint(&self) -> anyhow::Result<String> {
        let json = serde_json::to_string(self)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Builds a [`Plan`] stage by stage.
///
/// Steps are tagged with the stage most recently opened with
/// [`PlanBuilder::stage`].
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    stage: Stage,
    steps: Vec<PlannedStep>,
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self {
            stage: Stage::Init,
            steps: Vec::new(),
        }
    }
}

impl PlanBuilder {
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(PlannedStep {
            stage: self.stage,
            label: step.describe(),
            step,
        });
        self
    }

    pub fn deploy(self, spec: DeploySpec) -> Self {
        self.step(Step::Deploy(spec))
    }

    pub fn deploy_proxy(self, spec: ProxySpec) -> Self {
        self.step(Step::DeployProxy(spec))
    }

    pub fn adopt_proxy(self, spec: AdoptSpec) -> Self {
        self.step(Step::AdoptProxy(spec))
    }

    pub fn configure(self, call: crate::abi::CallSpec) -> Self {
        self.step(Step::Configure(call))
    }

    pub fn assign(self, assignment: crate::roles::RoleAssignment) -> Self {
        self.step(Step::Assign(assignment))
    }

    pub fn hand_off(self, assignment: crate::roles::RoleAssignment) -> Self {
        self.step(Step::HandOff(assignment))
    }

    pub fn borrow(self, loan: crate::ownership::OwnershipLoan) -> Self {
        self.step(Step::Borrow(loan))
    }

    pub fn init_reserves(self, batch: crate::reserves::ReserveBatch) -> Self {
        self.step(Step::InitReserves(batch))
    }

    pub fn verify(self, check: crate::roles::RoleCheck) -> Self {
        self.step(Step::Verify(check))
    }

    pub fn smoke_test(self, spec: crate::smoke::SmokeTestSpec) -> Self {
        self.step(Step::SmokeTest(spec))
    }

    pub fn build(self) -> Plan {
        Plan { steps: self.steps }
    }
}
