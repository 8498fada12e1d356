use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

/// Default path of the deployment report.
const DEFAULT_REPORT_PATH: &str = "deployment.json";

#[derive(Parser)]
#[command(name = "poolforge")]
#[command(
    author,
    version,
    about = "Deploy and wire a lending market with its reward distribution contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "POOLFORGE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Poolforge.toml configuration file.
    ///
    /// If not provided, ./Poolforge.toml is used when it exists and built-in
    /// defaults otherwise. Any value can also be set from the environment with
    /// the POOLFORGE_ prefix, nested keys separated by `__`
    /// (e.g. POOLFORGE_MARKET__MARKET_ID).
    #[arg(short, long, global = true, alias = "conf", env = "POOLFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the full deployment.
    Deploy(DeployArgs),

    /// Print the deployment plan without sending anything.
    Plan(PlanArgs),

    /// Write the default configuration to a file.
    InitConfig {
        /// Where to write the configuration.
        #[arg(default_value = poolforge_deploy::CONFIG_FILENAME)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Args)]
pub struct DeployArgs {
    /// The URL of the JSON-RPC endpoint. The node must hold the deployer's key.
    #[arg(long, alias = "rpc", env = "POOLFORGE_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Directory of compiled contract artifacts.
    #[arg(long, env = "POOLFORGE_ARTIFACTS")]
    pub artifacts: Option<PathBuf>,

    /// The account that sends every transaction.
    /// Defaults to the node's first account.
    #[arg(long, env = "POOLFORGE_DEPLOYER")]
    pub deployer: Option<Address>,

    /// The account receiving liquidation fees.
    /// Defaults to the node's second account.
    #[arg(long, env = "POOLFORGE_TREASURY")]
    pub treasury: Option<Address>,

    /// Run the plan against an in-process simulated chain with placeholder
    /// artifacts instead of a real node.
    #[arg(long, env = "POOLFORGE_DRY_RUN")]
    pub dry_run: bool,

    /// Where to write the deployment report.
    #[arg(long, env = "POOLFORGE_REPORT", default_value = DEFAULT_REPORT_PATH)]
    pub report: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Print the plan as JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}
