//! The chain the orchestrator talks to.
//!
//! Every state-changing operation returns only once the transaction has a
//! successful receipt, so callers can rely on the effects of one step being
//! visible to the next.

mod rpc;
mod sim;

pub use rpc::{JsonRpcNetwork, JsonRpcNetworkConfig};
pub use sim::{SimTransaction, SimulatedNetwork};

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, NetworkError};

/// A contract creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTx {
    pub from: Address,
    /// Artifact name, for logs and simulation.
    pub contract: String,
    /// Linked creation bytecode.
    pub bytecode: Bytes,
    /// ABI-encoded constructor arguments.
    pub constructor_args: Bytes,
}

impl DeployTx {
    /// Bytecode followed by the constructor arguments.
    pub fn init_code(&self) -> Bytes {
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&self.constructor_args);
        code.into()
    }
}

/// A call to an existing contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTx {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

/// A successful receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
}

/// The identities a run acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accounts {
    /// Sends every transaction and holds admin rights until handoff.
    pub deployer: Address,
    /// Receives liquidation fees.
    pub treasury: Address,
}

impl Accounts {
    /// Use the node's first two accounts unless overridden.
    pub async fn resolve<N: Network>(
        network: &N,
        deployer: Option<Address>,
        treasury: Option<Address>,
    ) -> Result<Self, NetworkError> {
        if let (Some(deployer), Some(treasury)) = (deployer, treasury) {
            return Ok(Self { deployer, treasury });
        }

        let accounts = network.accounts().await?;
        let pick = |index: usize| {
            accounts.get(index).copied().ok_or(NetworkError::NoAccounts {
                found: accounts.len(),
                required: index + 1,
            })
        };

        Ok(Self {
            deployer: deployer.map_or_else(|| pick(0), Ok)?,
            treasury: treasury.map_or_else(|| pick(1), Ok)?,
        })
    }
}

/// An EVM network reachable by the orchestrator.
pub trait Network: Send + Sync {
    /// Unlocked accounts, in node order.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, NetworkError>> + Send;

    /// Create a contract and wait for its receipt.
    fn deploy(&self, tx: DeployTx) -> impl Future<Output = Result<Receipt, NetworkError>> + Send;

    /// Send a state-changing call and wait for its receipt.
    fn send(&self, tx: CallTx) -> impl Future<Output = Result<Receipt, NetworkError>> + Send;

    /// Execute a read-only call against the latest state.
    fn call(&self, tx: CallTx) -> impl Future<Output = Result<Bytes, NetworkError>> + Send;
}

/// Run a read-only call on a registered contract, mapping failures to
/// [`DeployError::Query`].
pub(crate) async fn query<N: Network>(
    network: &N,
    from: Address,
    target: &str,
    to: Address,
    method: &str,
    data: Bytes,
) -> Result<Bytes, DeployError> {
    network
        .call(CallTx { from, to, data })
        .await
        .map_err(|source| DeployError::Query {
            target: target.to_string(),
            method: method.to_string(),
            source,
        })
}
