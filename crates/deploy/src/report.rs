//! Deployment reports written after a run, whether it completed or halted.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    AddressRegistry, DeploymentOutcome, FailedStep, OrchestrationFailure, Stage,
    network::Accounts, smoke::SmokeTestReport,
};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeploymentStatus {
    Completed,
    Halted {
        /// Last stage whose steps all completed.
        stage: Stage,
        step: Option<FailedStep>,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub generated_at: DateTime<Utc>,
    /// Version of the tool that produced the report.
    pub version: String,
    /// Fingerprint of the executed plan.
    pub plan_fingerprint: String,
    /// Where the plan ran.
    pub network: String,
    /// `None` when the run halted before the accounts were resolved.
    pub accounts: Option<Accounts>,
    pub deployments: AddressRegistry,
    pub smoke_test: Option<SmokeTestReport>,
    #[serde(flatten)]
    pub status: DeploymentStatus,
}

impl DeploymentReport {
    pub fn completed(
        plan_fingerprint: String,
        network: impl Into<String>,
        outcome: &DeploymentOutcome,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            plan_fingerprint,
            network: network.into(),
            accounts: Some(outcome.accounts),
            deployments: outcome.registry.clone(),
            smoke_test: outcome.smoke_test.clone(),
            status: DeploymentStatus::Completed,
        }
    }

    /// Report a halted run. Contracts deployed before the failure are listed
    /// so they can be inspected or reused by hand.
    pub fn halted(
        plan_fingerprint: String,
        network: impl Into<String>,
        failure: &OrchestrationFailure,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            plan_fingerprint,
            network: network.into(),
            accounts: failure.accounts,
            deployments: failure.registry.clone(),
            smoke_test: None,
            status: DeploymentStatus::Halted {
                stage: failure.stage,
                step: failure.step.clone(),
                error: failure.source.chain(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == DeploymentStatus::Completed
    }

    /// Save the report as formatted JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment report")?;

        std::fs::write(path, json).context(format!(
            "Failed to write deployment report to {}",
            path.display()
        ))?;

        tracing::info!(path = %path.display(), "Deployment report saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment report does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path).context(format!(
            "Failed to read deployment report from {}",
            path.display()
        ))?;

        serde_json::from_str(&content).context("Failed to parse deployment report JSON")
    }
}
