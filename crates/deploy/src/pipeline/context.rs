//! Everything a step needs to run.

use crate::{
    ArtifactStore,
    deployer::{Deployer, ProxySettings},
    network::{Accounts, Network},
    ownership::OwnershipHandoff,
    smoke::SmokeTest,
    wirer::ConfigurationWirer,
};

/// Borrowed view of an orchestrator's resources for one run.
pub struct DeployContext<'a, N> {
    pub network: &'a N,
    pub artifacts: &'a ArtifactStore,
    pub accounts: &'a Accounts,
    pub proxy: &'a ProxySettings,
}

impl<N> Clone for DeployContext<'_, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for DeployContext<'_, N> {}

impl<'a, N: Network> DeployContext<'a, N> {
    pub fn deployer(&self) -> Deployer<'a, N> {
        Deployer::new(self.network, self.artifacts, self.accounts, self.proxy)
    }

    pub fn wirer(&self) -> ConfigurationWirer<'a, N> {
        ConfigurationWirer::new(self.network, self.accounts)
    }

    pub fn handoff(&self) -> OwnershipHandoff<'a, N> {
        OwnershipHandoff::new(self.network, self.accounts)
    }

    pub fn smoke_test(&self) -> SmokeTest<'a, N> {
        SmokeTest::new(self.network, self.accounts)
    }
}
