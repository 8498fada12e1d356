//! Contract creation: plain deployments, proxy-wrapped deployments, and
//! adoption of proxies created by a factory contract.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    AddressRegistry, ArtifactStore, DeploymentKind, DeploymentRecord, InitializerCall,
    ProxyDeployment,
    abi::{Arg, Bindings, bind_all, decode_address, encode_call, encode_constructor, selector},
    error::{DeployError, NetworkError},
    linker::LibraryLinker,
    network::{Accounts, DeployTx, Network, Receipt, query},
};

/// Suffix of the logical name under which a proxy's implementation is registered.
pub const IMPLEMENTATION_SUFFIX: &str = "_Implementation";

/// A contract deployed directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySpec {
    /// Logical name to register.
    pub name: String,
    /// Artifact name, when it differs from the logical name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Arg>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<String>,
    /// Register as the logic contract of a proxy created elsewhere.
    #[serde(default)]
    pub implementation: bool,
}

impl DeploySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: None,
            args: Vec::new(),
            libraries: Vec::new(),
            implementation: false,
        }
    }

    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn args(mut self, args: Vec<Arg>) -> Self {
        self.args = args;
        self
    }

    pub fn libraries<I, S>(mut self, libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.libraries = libraries.into_iter().map(Into::into).collect();
        self
    }

    pub fn implementation(mut self) -> Self {
        self.implementation = true;
        self
    }

    pub fn artifact(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }
}

/// The one-time setup call of a proxy, with symbolic arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializerSpec {
    pub method: String,
    pub args: Vec<Arg>,
}

impl InitializerSpec {
    pub fn new(method: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }
}

/// A contract deployed behind an upgradeable proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySpec {
    /// Logical name of the proxy.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// Constructor arguments of the implementation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Arg>,
    pub initializer: InitializerSpec,
}

impl ProxySpec {
    pub fn new(name: impl Into<String>, initializer: InitializerSpec) -> Self {
        Self {
            name: name.into(),
            contract: None,
            args: Vec::new(),
            initializer,
        }
    }

    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn artifact(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }

    /// Logical name of the implementation.
    pub fn implementation_name(&self) -> String {
        format!("{}{IMPLEMENTATION_SUFFIX}", self.name)
    }
}

/// A proxy created by a factory contract, read back through a getter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptSpec {
    /// Logical name to register the proxy under.
    pub name: String,
    /// Contract that created the proxy.
    pub factory: String,
    /// Parameterless getter returning the proxy address.
    pub getter: String,
    /// Logical name of the implementation behind the proxy.
    pub implementation: String,
}

/// Which proxy contract wraps proxied deployments and who administers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Proxy artifact, constructed with `(logic, admin, data)`.
    pub contract: String,
    /// Logical name of the proxy admin, deployed by the plan.
    pub admin: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            contract: "TransparentUpgradeableProxy".to_string(),
            admin: "DefaultProxyAdmin".to_string(),
        }
    }
}

pub struct Deployer<'a, N> {
    network: &'a N,
    artifacts: &'a ArtifactStore,
    accounts: &'a Accounts,
    proxy: &'a ProxySettings,
}

impl<'a, N: Network> Deployer<'a, N> {
    pub fn new(
        network: &'a N,
        artifacts: &'a ArtifactStore,
        accounts: &'a Accounts,
        proxy: &'a ProxySettings,
    ) -> Self {
        Self {
            network,
            artifacts,
            accounts,
            proxy,
        }
    }

    /// Deploy a contract and register it.
    pub async fn deploy_plain(
        &self,
        registry: &mut AddressRegistry,
        spec: &DeploySpec,
    ) -> Result<DeploymentRecord, DeployError> {
        registry.ensure_vacant(&spec.name)?;

        let kind = if spec.implementation {
            DeploymentKind::ProxyImplementation
        } else {
            DeploymentKind::Plain
        };
        let record = self
            .create(
                registry,
                &spec.name,
                spec.artifact(),
                &spec.args,
                &spec.libraries,
                kind,
            )
            .await?;

        registry.register(record.clone())?;
        Ok(record)
    }

    /// Deploy an implementation, then a proxy whose constructor runs the
    /// initializer.
    ///
    /// The initializer is bound and encoded before anything is sent. The
    /// implementation is registered as soon as it exists, so if the proxy
    /// fails it stays visible in the registry as an orphan.
    pub async fn deploy_behind_proxy(
        &self,
        registry: &mut AddressRegistry,
        spec: &ProxySpec,
    ) -> Result<ProxyDeployment, DeployError> {
        let implementation_name = spec.implementation_name();
        registry.ensure_vacant(&spec.name)?;
        registry.ensure_vacant(&implementation_name)?;

        // Everything that can fail locally is checked before the first transaction.
        let bindings = Bindings {
            registry: &*registry,
            accounts: self.accounts,
        };
        let init_args = bind_all(&spec.initializer.args, &bindings)?;
        let init_data = encode_call(&spec.initializer.method, &init_args)?;
        let admin = registry.address(&self.proxy.admin)?;
        let linked = LibraryLinker::new(&*registry).link(
            &spec.name,
            self.artifacts.get(&self.proxy.contract)?,
            &[],
        )?;

        let implementation = self
            .create(
                registry,
                &implementation_name,
                spec.artifact(),
                &spec.args,
                &[],
                DeploymentKind::ProxyImplementation,
            )
            .await?;
        registry.register(implementation.clone())?;

        let proxy_args = vec![
            Arg::Address(implementation.address),
            Arg::Address(admin),
            Arg::Bytes(init_data),
        ];
        let tx = DeployTx {
            from: self.accounts.deployer,
            contract: self.proxy.contract.clone(),
            bytecode: linked.bytecode,
            constructor_args: encode_constructor(&proxy_args)?,
        };

        tracing::info!(
            name = %spec.name,
            implementation = %implementation.address,
            initializer = %spec.initializer.method,
            "Deploying proxy..."
        );
        let receipt = self
            .network
            .deploy(tx)
            .await
            .map_err(|source| DeployError::Initialization {
                name: spec.name.clone(),
                method: spec.initializer.method.clone(),
                source,
            })?;
        let address = created_address(&receipt).map_err(|source| DeployError::Initialization {
            name: spec.name.clone(),
            method: spec.initializer.method.clone(),
            source,
        })?;
        tracing::info!(name = %spec.name, %address, tx_hash = %receipt.tx_hash, "Proxy deployed and initialized");

        let proxy = DeploymentRecord {
            name: spec.name.clone(),
            contract: self.proxy.contract.clone(),
            address,
            kind: DeploymentKind::ProxyInstance {
                implementation: implementation.address,
                initializer: Some(InitializerCall::new(
                    spec.initializer.method.clone(),
                    init_args,
                )),
            },
            constructor_args: proxy_args,
            libraries: BTreeSet::new(),
            tx_hash: Some(receipt.tx_hash),
        };
        registry.register(proxy.clone())?;

        Ok(ProxyDeployment {
            implementation,
            proxy,
        })
    }

    /// Register a proxy that a factory contract created and initialized.
    pub async fn adopt_proxy(
        &self,
        registry: &mut AddressRegistry,
        spec: &AdoptSpec,
    ) -> Result<DeploymentRecord, DeployError> {
        registry.ensure_vacant(&spec.name)?;
        let implementation = registry.resolve(&spec.implementation)?;
        let factory = registry.address(&spec.factory)?;

        let raw = query(
            self.network,
            self.accounts.deployer,
            &spec.factory,
            factory,
            &spec.getter,
            selector(&spec.getter).to_vec().into(),
        )
        .await?;
        let address = decode_address(&raw)
            .ok()
            .filter(|address| !address.is_zero())
            .ok_or_else(|| DeployError::Query {
                target: spec.factory.clone(),
                method: spec.getter.clone(),
                source: NetworkError::Decode(format!("no proxy address for {}", spec.name)),
            })?;
        tracing::info!(name = %spec.name, %address, factory = %spec.factory, "Adopted proxy");

        let record = DeploymentRecord {
            name: spec.name.clone(),
            contract: implementation.contract.clone(),
            address,
            kind: DeploymentKind::ProxyInstance {
                implementation: implementation.address,
                initializer: None,
            },
            constructor_args: Vec::new(),
            libraries: BTreeSet::new(),
            tx_hash: None,
        };
        registry.register(record.clone())?;
        Ok(record)
    }

    /// Link, bind, submit and wait. Does not register.
    async fn create(
        &self,
        registry: &AddressRegistry,
        name: &str,
        contract: &str,
        args: &[Arg],
        libraries: &[String],
        kind: DeploymentKind,
    ) -> Result<DeploymentRecord, DeployError> {
        let artifact = self.artifacts.get(contract)?;
        let linked = LibraryLinker::new(registry).link(name, artifact, libraries)?;
        let bindings = Bindings {
            registry,
            accounts: self.accounts,
        };
        let constructor_args = bind_all(args, &bindings)?;

        let tx = DeployTx {
            from: self.accounts.deployer,
            contract: contract.to_string(),
            bytecode: linked.bytecode,
            constructor_args: encode_constructor(&constructor_args)?,
        };

        tracing::info!(name, contract, libraries = linked.libraries.len(), "Deploying contract...");
        let rejected = |source| DeployError::DeploymentRejected {
            name: name.to_string(),
            source,
        };
        let receipt = self.network.deploy(tx).await.map_err(rejected)?;
        let address = created_address(&receipt).map_err(rejected)?;
        tracing::info!(name, %address, tx_hash = %receipt.tx_hash, "Contract deployed");

        Ok(DeploymentRecord {
            name: name.to_string(),
            contract: contract.to_string(),
            address,
            kind,
            constructor_args,
            libraries: linked.libraries.into_keys().collect(),
            tx_hash: Some(receipt.tx_hash),
        })
    }
}

fn created_address(receipt: &Receipt) -> Result<alloy_core::primitives::Address, NetworkError> {
    receipt
        .contract_address
        .ok_or_else(|| NetworkError::Decode("receipt carries no contract address".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedNetwork;

    struct Fixture {
        network: SimulatedNetwork,
        artifacts: ArtifactStore,
        accounts: Accounts,
        proxy: ProxySettings,
    }

    impl Fixture {
        async fn new(network: SimulatedNetwork) -> Self {
            let accounts = Accounts::resolve(&network, None, None).await.unwrap();
            let artifacts = ArtifactStore::placeholders([
                ("ReserveLogic", vec![]),
                ("GenericLogic", vec![]),
                ("ValidationLogic", vec!["GenericLogic"]),
                ("ProxyAdmin", vec![]),
                ("TransparentUpgradeableProxy", vec![]),
                ("PriceProvider", vec![]),
            ]);
            Self {
                network,
                artifacts,
                accounts,
                proxy: ProxySettings::default(),
            }
        }

        fn deployer(&self) -> Deployer<'_, SimulatedNetwork> {
            Deployer::new(&self.network, &self.artifacts, &self.accounts, &self.proxy)
        }
    }

    fn price_provider() -> ProxySpec {
        ProxySpec::new(
            "PriceProvider",
            InitializerSpec::new(
                "initialize(address,address,address,uint256)",
                vec![
                    Arg::Address(Default::default()),
                    Arg::Deployer,
                    Arg::Treasury,
                    Arg::u64(1800),
                ],
            ),
        )
    }

    #[tokio::test]
    async fn test_deploy_plain_registers_libraries() {
        let fixture = Fixture::new(SimulatedNetwork::new()).await;
        let mut registry = AddressRegistry::default();
        let deployer = fixture.deployer();

        deployer
            .deploy_plain(&mut registry, &DeploySpec::new("GenericLogic"))
            .await
            .unwrap();
        let record = deployer
            .deploy_plain(
                &mut registry,
                &DeploySpec::new("ValidationLogic").libraries(["GenericLogic"]),
            )
            .await
            .unwrap();

        assert_eq!(record.libraries, BTreeSet::from(["GenericLogic".to_string()]));
        assert_eq!(record.kind, DeploymentKind::Plain);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_library_must_precede_dependent() {
        let fixture = Fixture::new(SimulatedNetwork::new()).await;
        let mut registry = AddressRegistry::default();

        let err = fixture
            .deployer()
            .deploy_plain(&mut registry, &DeploySpec::new("ValidationLogic"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::UnresolvedLibrary { .. }));
        assert!(
            fixture.network.transactions().await.is_empty(),
            "nothing may be sent for an unlinkable contract"
        );
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected_before_sending() {
        let fixture = Fixture::new(SimulatedNetwork::new()).await;
        let mut registry = AddressRegistry::default();
        let deployer = fixture.deployer();

        deployer
            .deploy_plain(&mut registry, &DeploySpec::new("ReserveLogic"))
            .await
            .unwrap();
        let err = deployer
            .deploy_plain(&mut registry, &DeploySpec::new("ReserveLogic"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::DuplicateName(_)));
        assert_eq!(fixture.network.transactions().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_deployment() {
        let fixture = Fixture::new(SimulatedNetwork::new().failing_deploy("ReserveLogic")).await;
        let mut registry = AddressRegistry::default();

        let err = fixture
            .deployer()
            .deploy_plain(&mut registry, &DeploySpec::new("ReserveLogic"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::DeploymentRejected { ref name, .. } if name == "ReserveLogic"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_missing_artifact() {
        let fixture = Fixture::new(SimulatedNetwork::new()).await;
        let mut registry = AddressRegistry::default();

        let err = fixture
            .deployer()
            .deploy_plain(&mut registry, &DeploySpec::new("MFDstats"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::MissingArtifact(name) if name == "MFDstats"));
    }

    #[tokio::test]
    async fn test_deploy_behind_proxy() {
        let fixture = Fixture::new(SimulatedNetwork::new()).await;
        let mut registry = AddressRegistry::default();
        let deployer = fixture.deployer();

        deployer
            .deploy_plain(
                &mut registry,
                &DeploySpec::new("DefaultProxyAdmin")
                    .contract("ProxyAdmin")
                    .args(vec![Arg::Deployer]),
            )
            .await
            .unwrap();
        let deployment = deployer
            .deploy_behind_proxy(&mut registry, &price_provider())
            .await
            .unwrap();

        assert_eq!(deployment.implementation.name, "PriceProvider_Implementation");
        assert_eq!(deployment.implementation.kind, DeploymentKind::ProxyImplementation);
        let DeploymentKind::ProxyInstance {
            implementation,
            initializer: Some(initializer),
        } = &deployment.proxy.kind
        else {
            panic!("unexpected kind: {:?}", deployment.proxy.kind);
        };
        assert_eq!(*implementation, deployment.implementation.address);
        assert_eq!(initializer.method(), "initialize(address,address,address,uint256)");
        assert_eq!(initializer.args()[1], Arg::Address(fixture.accounts.deployer));
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["DefaultProxyAdmin", "PriceProvider_Implementation", "PriceProvider"]
        );
        assert_eq!(
            fixture.network.implementation_of(deployment.proxy.address).await,
            Some(deployment.implementation.address)
        );
    }

    #[tokio::test]
    async fn test_failed_initializer_leaves_visible_orphan() {
        let network = SimulatedNetwork::new().failing_call("initialize(address,address,address,uint256)");
        let fixture = Fixture::new(network).await;
        let mut registry = AddressRegistry::default();
        let deployer = fixture.deployer();

        deployer
            .deploy_plain(
                &mut registry,
                &DeploySpec::new("DefaultProxyAdmin").contract("ProxyAdmin"),
            )
            .await
            .unwrap();
        let err = deployer
            .deploy_behind_proxy(&mut registry, &price_provider())
            .await
            .unwrap_err();

        assert!(
            matches!(&err, DeployError::Initialization { name, .. } if name == "PriceProvider"),
            "unexpected error: {err}"
        );
        assert!(registry.contains("PriceProvider_Implementation"));
        assert!(!registry.contains("PriceProvider"));
    }

    #[tokio::test]
    async fn test_proxy_requires_admin() {
        let fixture = Fixture::new(SimulatedNetwork::new()).await;
        let mut registry = AddressRegistry::default();

        let err = fixture
            .deployer()
            .deploy_behind_proxy(&mut registry, &price_provider())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::UnknownName(name) if name == "DefaultProxyAdmin"));
        assert!(registry.is_empty());
        assert!(fixture.network.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_mistyped_initializer_sends_nothing() {
        let fixture = Fixture::new(SimulatedNetwork::new()).await;
        let mut registry = AddressRegistry::default();
        let deployer = fixture.deployer();

        deployer
            .deploy_plain(
                &mut registry,
                &DeploySpec::new("DefaultProxyAdmin").contract("ProxyAdmin"),
            )
            .await
            .unwrap();
        let spec = ProxySpec::new(
            "PriceProvider",
            InitializerSpec::new(
                "initialize(address,address,address,uint256)",
                vec![Arg::Deployer, Arg::u64(1800)],
            ),
        );
        let err = deployer
            .deploy_behind_proxy(&mut registry, &spec)
            .await
            .unwrap_err();

        assert!(
            matches!(&err, DeployError::InvalidArguments { signature, .. } if signature.starts_with("initialize(")),
            "unexpected error: {err}"
        );
        assert!(!registry.contains("PriceProvider_Implementation"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["DefaultProxyAdmin"]);
        assert_eq!(fixture.network.transactions().await.len(), 1);
    }

    #[test]
    fn test_spec_artifact_defaults_to_name() {
        assert_eq!(DeploySpec::new("MFDstats").artifact(), "MFDstats");
        assert_eq!(DeploySpec::new("AaveAToken").contract("AToken").artifact(), "AToken");
    }
}
