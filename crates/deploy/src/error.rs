//! Error taxonomy for a deployment run.
//!
//! Errors fall in two groups: local failures detected before anything is sent
//! (unknown names, missing artifacts, malformed plans) and failures reported by
//! the network for a transaction that was attempted. Both abort the run.

use alloy_core::primitives::{Address, B256};
use thiserror::Error;

/// Failures reported by a [`Network`](crate::Network) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The node refused the transaction or call before it was mined.
    #[error("rejected by node: {0}")]
    Rejected(String),

    /// The transaction was mined but its status reports failure.
    #[error("transaction {tx_hash} reverted: {reason}")]
    Reverted { tx_hash: B256, reason: String },

    /// The receipt is not available yet.
    #[error("receipt for {0} is not available yet")]
    Pending(B256),

    /// No receipt showed up before the configured deadline.
    #[error("timed out waiting for the receipt of {0}")]
    Timeout(B256),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    /// The node did not expose enough unlocked accounts.
    #[error("node exposes {found} unlocked account(s), {required} required")]
    NoAccounts { found: usize, required: usize },
}

/// Every way a deployment step can fail.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("`{0}` is already registered")]
    DuplicateName(String),

    #[error("`{0}` is not registered")]
    UnknownName(String),

    #[error("`{contract}` links against library `{library}` which has not been deployed")]
    UnresolvedLibrary { contract: String, library: String },

    #[error("no compiled artifact found for contract `{0}`")]
    MissingArtifact(String),

    #[error("invalid arguments for `{signature}`: {reason}")]
    InvalidArguments { signature: String, reason: String },

    #[error("plan step {index} (`{label}`) is out of order: {reason}")]
    PlanOrder {
        index: usize,
        label: String,
        reason: String,
    },

    #[error("failed to resolve deployment accounts")]
    Accounts(#[source] NetworkError),

    #[error("deployment of `{name}` was rejected")]
    DeploymentRejected {
        name: String,
        #[source]
        source: NetworkError,
    },

    #[error("initializer `{method}` of proxy `{name}` failed")]
    Initialization {
        name: String,
        method: String,
        #[source]
        source: NetworkError,
    },

    #[error("configuration call `{method}` on `{target}` failed")]
    ConfigurationCall {
        target: String,
        method: String,
        #[source]
        source: NetworkError,
    },

    #[error("read `{method}` on `{target}` failed")]
    Query {
        target: String,
        method: String,
        #[source]
        source: NetworkError,
    },

    #[error("`{target}` is held by {actual}, expected {expected}")]
    OwnershipMismatch {
        target: String,
        expected: Address,
        actual: Address,
    },

    #[error("smoke test failed while {action}: {reason}")]
    SmokeTest { action: String, reason: String },
}

impl DeployError {
    /// Whether the error was detected locally, before any transaction for the
    /// failing step was sent.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName(_)
                | Self::UnknownName(_)
                | Self::UnresolvedLibrary { .. }
                | Self::MissingArtifact(_)
                | Self::InvalidArguments { .. }
                | Self::PlanOrder { .. }
        )
    }

    /// The network error underneath, if the failure came from the chain.
    pub fn network_error(&self) -> Option<&NetworkError> {
        match self {
            Self::Accounts(source)
            | Self::DeploymentRejected { source, .. }
            | Self::Initialization { source, .. }
            | Self::ConfigurationCall { source, .. }
            | Self::Query { source, .. } => Some(source),
            _ => None,
        }
    }

    /// This error followed by each of its sources, joined with `: `.
    pub fn chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}
