//! Run-scoped record of everything deployed so far.

use std::collections::{BTreeSet, HashMap};

use alloy_core::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

use crate::{abi::Arg, error::DeployError};

/// The one-time setup call executed by a proxy's constructor.
///
/// Only the [`Deployer`](crate::Deployer) builds these, while it deploys the
/// proxy; the record keeps it for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializerCall {
    method: String,
    args: Vec<Arg>,
}

impl InitializerCall {
    pub(crate) fn new(method: String, args: Vec<Arg>) -> Self {
        Self { method, args }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }
}

/// How a unit was deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeploymentKind {
    Plain,
    /// Logic contract reached through a proxy.
    ProxyImplementation,
    /// Upgradeable proxy. `initializer` is `None` when the proxy was created
    /// and initialized by a factory contract.
    ProxyInstance {
        implementation: Address,
        initializer: Option<InitializerCall>,
    },
}

/// One deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Logical name, unique within a run.
    pub name: String,
    /// Compiled artifact the code came from.
    pub contract: String,
    pub address: Address,
    #[serde(flatten)]
    pub kind: DeploymentKind,
    /// Bound constructor arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructor_args: Vec<Arg>,
    /// Libraries linked into the bytecode.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub libraries: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<B256>,
}

impl DeploymentRecord {
    /// A plain record with no constructor arguments or libraries.
    pub fn plain(name: impl Into<String>, contract: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            contract: contract.into(),
            address,
            kind: DeploymentKind::Plain,
            constructor_args: Vec::new(),
            libraries: BTreeSet::new(),
            tx_hash: None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, DeploymentKind::ProxyInstance { .. })
    }
}

/// An implementation and the proxy in front of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDeployment {
    pub implementation: DeploymentRecord,
    pub proxy: DeploymentRecord,
}

/// Insertion-ordered, append-only map from logical name to deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressRegistry {
    records: Vec<DeploymentRecord>,
    index: HashMap<String, usize>,
}

impl AddressRegistry {
    /// Record a new deployment. Names can only be registered once.
    pub fn register(&mut self, record: DeploymentRecord) -> Result<(), DeployError> {
        if self.index.contains_key(&record.name) {
            return Err(DeployError::DuplicateName(record.name));
        }
        self.index.insert(record.name.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&DeploymentRecord, DeployError> {
        self.index
            .get(name)
            .map(|&i| &self.records[i])
            .ok_or_else(|| DeployError::UnknownName(name.to_string()))
    }

    pub fn address(&self, name: &str) -> Result<Address, DeployError> {
        self.resolve(name).map(|record| record.address)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Fail with [`DeployError::DuplicateName`] if `name` is taken.
    pub fn ensure_vacant(&self, name: &str) -> Result<(), DeployError> {
        if self.contains(name) {
            return Err(DeployError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Records in registration order.
    pub fn records(&self) -> &[DeploymentRecord] {
        &self.records
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Serialize for AddressRegistry {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AddressRegistry {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut registry = Self::default();
        for record in Vec::<DeploymentRecord>::deserialize(deserializer)? {
            registry.register(record).map_err(serde::de::Error::custom)?;
        }
        Ok(registry)
    }
}
