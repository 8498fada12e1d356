//! poolforge deploys an Aave-style lending market, its reward and
//! fee-distribution contracts and hands every privileged role to its final owner.

mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use strum::IntoEnumIterator;

use cli::{Cli, Command, DeployArgs, PlanArgs};
use poolforge_deploy::{
    AddressRegistry, ArtifactStore, CONFIG_FILENAME, DeployConfig, DeploymentKind,
    DeploymentReport, JsonRpcNetwork, Network, Orchestrator, Plan, SimulatedNetwork, Stage,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match cli.command {
        Command::InitConfig { path, force } => init_config(&path, force),
        Command::Plan(args) => {
            let config = load_config(cli.config.as_deref())?;
            print_plan(&config, &args)
        }
        Command::Deploy(args) => {
            let config = load_config(cli.config.as_deref())?;
            deploy(config, args).await
        }
    }
}

/// Layer the configuration: built-in defaults, then the TOML file, then
/// `POOLFORGE_*` environment variables.
fn load_config(path: Option<&Path>) -> Result<DeployConfig> {
    let mut figment = Figment::from(Serialized::defaults(DeployConfig::default()));

    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file does not exist: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }
        None if Path::new(CONFIG_FILENAME).exists() => {
            figment = figment.merge(Toml::file(CONFIG_FILENAME));
        }
        None => {}
    }

    let config: DeployConfig = figment
        .merge(Env::prefixed("POOLFORGE_").split("__"))
        .extract()
        .context("Failed to load configuration")?;

    tracing::debug!(?config, "Configuration resolved");
    Ok(config)
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    DeployConfig::default().save_to_file(path)
}

fn print_plan(config: &DeployConfig, args: &PlanArgs) -> Result<()> {
    let plan = config.plan();
    plan.validate(&config.proxy)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Stage", "Step"]);
    for (index, step) in plan.iter().enumerate() {
        table.add_row(vec![
            (index + 1).to_string(),
            step.stage.to_string(),
            step.label.clone(),
        ]);
    }
    println!("{table}");

    let mut summary = Table::new();
    summary.load_preset(UTF8_FULL);
    summary.set_header(vec!["Stage", "Steps"]);
    for stage in Stage::iter().filter(|stage| stage.has_steps()) {
        let count = plan.iter().filter(|step| step.stage == stage).count();
        summary.add_row(vec![stage.to_string(), count.to_string()]);
    }
    println!("{summary}");
    println!(
        "{} contracts, plan fingerprint {}",
        plan.contracts(&config.proxy).len(),
        plan.fingerprint()?
    );

    Ok(())
}

async fn deploy(mut config: DeployConfig, args: DeployArgs) -> Result<()> {
    if let Some(rpc_url) = args.rpc_url {
        config.network.rpc.rpc_url = rpc_url;
    }
    if let Some(artifacts) = args.artifacts {
        config.artifacts = Some(artifacts);
    }
    if args.deployer.is_some() {
        config.network.deployer = args.deployer;
    }
    if args.treasury.is_some() {
        config.network.treasury = args.treasury;
    }

    let plan = config.plan();

    if args.dry_run {
        tracing::info!("Dry run against a simulated chain with placeholder artifacts");
        let artifacts = plan.placeholder_artifacts(&config.proxy);
        let orchestrator = Orchestrator::new(SimulatedNetwork::new(), artifacts, config.proxy)
            .with_accounts(config.network.deployer, config.network.treasury);
        return execute(&orchestrator, &plan, "simulated", &args.report).await;
    }

    let artifacts_dir: PathBuf = config.artifacts.clone().context(
        "No artifacts directory configured, pass --artifacts or set `artifacts` in the config file",
    )?;
    let artifacts = ArtifactStore::load_dir(&artifacts_dir)?;
    let network_name = config.network.rpc.rpc_url.clone();
    let network = JsonRpcNetwork::new(config.network.rpc)?;

    tracing::info!(
        rpc_url = %network_name,
        artifacts = %artifacts_dir.display(),
        market_id = %config.market.market_id,
        "Deploying lending market..."
    );

    let orchestrator = Orchestrator::new(network, artifacts, config.proxy)
        .with_accounts(config.network.deployer, config.network.treasury);
    execute(&orchestrator, &plan, &network_name, &args.report).await
}

/// Run the plan and write the report, whatever the outcome.
async fn execute<N: Network>(
    orchestrator: &Orchestrator<N>,
    plan: &Plan,
    network_name: &str,
    report_path: &Path,
) -> Result<()> {
    let fingerprint = plan.fingerprint()?;

    match orchestrator.run(plan).await {
        Ok(outcome) => {
            print_deployments(&outcome.registry);
            DeploymentReport::completed(fingerprint, network_name, &outcome)
                .save_to_file(report_path)?;
            Ok(())
        }
        Err(failure) => {
            if !failure.registry.is_empty() {
                print_deployments(&failure.registry);
            }
            DeploymentReport::halted(fingerprint, network_name, &failure)
                .save_to_file(report_path)?;
            Err(failure.into())
        }
    }
}

fn print_deployments(registry: &AddressRegistry) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Name", "Contract", "Address", "Kind"]);
    for record in registry.records() {
        let kind = match &record.kind {
            DeploymentKind::Plain => "plain".to_string(),
            DeploymentKind::ProxyImplementation => "implementation".to_string(),
            DeploymentKind::ProxyInstance { implementation, .. } => {
                format!("proxy -> {implementation}")
            }
        };
        table.add_row(vec![
            record.name.clone(),
            record.contract.clone(),
            record.address.to_string(),
            kind,
        ]);
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let temp_dir = TempDir::new("poolforge-cli").unwrap();
        let path = temp_dir.path().join(CONFIG_FILENAME);

        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        init_config(&path, true).unwrap();
    }

    #[test]
    fn test_explicit_config_file_is_loaded() {
        let temp_dir = TempDir::new("poolforge-cli").unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(&path, "[market]\nmarket_id = \"FromFile\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.market.market_id, "FromFile");
        assert_eq!(config.proxy, DeployConfig::default().proxy);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let temp_dir = TempDir::new("poolforge-cli").unwrap();
        assert!(load_config(Some(&temp_dir.path().join("missing.toml"))).is_err());
    }

    #[tokio::test]
    async fn test_dry_run_writes_a_report() {
        let temp_dir = TempDir::new("poolforge-cli").unwrap();
        let report = temp_dir.path().join("deployment.json");

        let args = DeployArgs {
            rpc_url: None,
            artifacts: None,
            deployer: None,
            treasury: None,
            dry_run: true,
            report: report.clone(),
        };
        deploy(DeployConfig::default(), args).await.unwrap();

        let report = DeploymentReport::load_from_file(&report).unwrap();
        assert!(report.is_completed());
        assert!(report.deployments.contains("LendingPool"));
        assert!(report.smoke_test.is_some());
    }
}
