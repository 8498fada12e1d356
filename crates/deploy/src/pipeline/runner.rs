//! Plan execution.

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use super::{DeployContext, Plan, Stage, Step};
use crate::{
    AddressRegistry, ArtifactStore,
    deployer::ProxySettings,
    error::DeployError,
    network::{Accounts, Network},
    smoke::SmokeTestReport,
};

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    pub accounts: Accounts,
    pub registry: AddressRegistry,
    pub smoke_test: Option<SmokeTestReport>,
}

/// The step a run halted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub index: usize,
    pub label: String,
}

/// A halted run. Everything deployed before the failure stays registered.
#[derive(Debug, thiserror::Error)]
#[error("deployment halted after stage {stage}: {source}")]
pub struct OrchestrationFailure {
    /// Last stage whose steps all completed.
    pub stage: Stage,
    /// `None` when the run failed before its first step.
    pub step: Option<FailedStep>,
    #[source]
    pub source: DeployError,
    /// `None` when the run failed before the accounts were resolved.
    pub accounts: Option<Accounts>,
    pub registry: AddressRegistry,
}

pub struct Orchestrator<N> {
    network: N,
    artifacts: ArtifactStore,
    proxy: ProxySettings,
    deployer: Option<Address>,
    treasury: Option<Address>,
}

impl<N: Network> Orchestrator<N> {
    pub fn new(network: N, artifacts: ArtifactStore, proxy: ProxySettings) -> Self {
        Self {
            network,
            artifacts,
            proxy,
            deployer: None,
            treasury: None,
        }
    }

    /// Override the accounts otherwise taken from the node.
    pub fn with_accounts(mut self, deployer: Option<Address>, treasury: Option<Address>) -> Self {
        self.deployer = deployer;
        self.treasury = treasury;
        self
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    /// Validate and run `plan`, strictly in order. The first failure halts
    /// the run in place.
    pub async fn run(&self, plan: &Plan) -> Result<DeploymentOutcome, OrchestrationFailure> {
        let before_first_step = |source| OrchestrationFailure {
            stage: Stage::Init,
            step: None,
            source,
            accounts: None,
            registry: AddressRegistry::default(),
        };

        plan.validate(&self.proxy).map_err(before_first_step)?;
        let accounts = Accounts::resolve(&self.network, self.deployer, self.treasury)
            .await
            .map_err(|e| before_first_step(DeployError::Accounts(e)))?;
        tracing::info!(
            deployer = %accounts.deployer,
            treasury = %accounts.treasury,
            steps = plan.len(),
            "Starting deployment..."
        );

        let ctx = DeployContext {
            network: &self.network,
            artifacts: &self.artifacts,
            accounts: &accounts,
            proxy: &self.proxy,
        };
        let mut registry = AddressRegistry::default();
        let mut smoke_test = None;
        let mut reached = Stage::Init;

        let steps = plan.steps();
        for (index, planned) in steps.iter().enumerate() {
            tracing::info!(
                stage = %planned.stage,
                step = index + 1,
                total = steps.len(),
                "{}",
                planned.label
            );

            if let Err(source) = execute(ctx, &mut registry, &planned.step, &mut smoke_test).await {
                tracing::error!(
                    stage = %reached,
                    step = %planned.label,
                    error = %source.chain(),
                    "Deployment halted"
                );
                return Err(OrchestrationFailure {
                    stage: reached,
                    step: Some(FailedStep {
                        index,
                        label: planned.label.clone(),
                    }),
                    source,
                    accounts: Some(accounts),
                    registry,
                });
            }

            let group_complete = steps
                .get(index + 1)
                .map_or(true, |next| next.stage != planned.stage);
            if group_complete {
                tracing::info!(from = %reached, to = %planned.stage, "Stage reached");
                reached = planned.stage;
            }
        }

        tracing::info!(
            from = %reached,
            to = %Stage::Done,
            contracts = registry.len(),
            "Deployment complete"
        );
        Ok(DeploymentOutcome {
            accounts,
            registry,
            smoke_test,
        })
    }
}

async fn execute<N: Network>(
    ctx: DeployContext<'_, N>,
    registry: &mut AddressRegistry,
    step: &Step,
    smoke_test: &mut Option<SmokeTestReport>,
) -> Result<(), DeployError> {
    match step {
        Step::Deploy(spec) => {
            ctx.deployer().deploy_plain(registry, spec).await?;
        }
        Step::DeployProxy(spec) => {
            ctx.deployer().deploy_behind_proxy(registry, spec).await?;
        }
        Step::AdoptProxy(spec) => {
            ctx.deployer().adopt_proxy(registry, spec).await?;
        }
        Step::Configure(call) => {
            ctx.wirer().apply(registry, call).await?;
        }
        Step::Assign(assignment) => {
            ctx.wirer().assign(registry, assignment).await?;
        }
        Step::HandOff(assignment) => {
            ctx.handoff().hand_off(registry, assignment).await?;
        }
        Step::Borrow(loan) => ctx.handoff().lend(registry, loan).await?,
        Step::InitReserves(batch) => {
            ctx.wirer().init_reserves(registry, batch).await?;
        }
        Step::Verify(check) => {
            ctx.handoff().verify(registry, check).await?;
        }
        Step::SmokeTest(spec) => {
            *smoke_test = Some(ctx.smoke_test().run(registry, spec).await?);
        }
    }
    Ok(())
}
