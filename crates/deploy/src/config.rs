//! On-disk configuration of a deployment.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    JsonRpcNetworkConfig, MarketConfig, Plan, ProxySettings, SmokeTestSpec, lending_market,
};

/// Default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Poolforge.toml";

/// Node connection and the accounts to act as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(flatten)]
    pub rpc: JsonRpcNetworkConfig,
    /// Defaults to the node's first account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    /// Defaults to the node's second account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treasury: Option<Address>,
}

/// Everything needed to run the standard lending market deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Directory of compiled contract artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<PathBuf>,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub proxy: ProxySettings,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub smoke_test: SmokeTestSpec,
}

impl DeployConfig {
    /// The plan this configuration describes.
    pub fn plan(&self) -> Plan {
        lending_market(&self.market, &self.smoke_test)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deploy config to TOML")?;

        std::fs::write(path, content)
            .context(format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load a configuration from a TOML file. Missing sections take their
    /// defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Config file does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;

        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }
}
