//! [`Network`] over Ethereum JSON-RPC.
//!
//! Transactions are sent with `eth_sendTransaction`, so the node must hold the
//! deployer's key (a dev node, or a node with an unlocked account).

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use alloy_sol_types::decode_revert_reason;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use url::Url;

use super::{CallTx, DeployTx, Network, Receipt};
use crate::error::NetworkError;

/// Default timeout for a single HTTP request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection and confirmation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcNetworkConfig {
    /// HTTP endpoint of the node.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Blocks that must exist on top of (and including) the receipt's block.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// How long to wait for a receipt before giving up.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_confirmations() -> u64 {
    1
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for JsonRpcNetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            confirmations: default_confirmations(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl JsonRpcNetworkConfig {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Polling attempts that fit in the receipt timeout.
    fn max_polls(&self) -> usize {
        let timeout = Duration::from_secs(self.receipt_timeout_secs).as_millis();
        (timeout / self.poll_interval().as_millis()).max(1) as usize
    }
}

pub struct JsonRpcNetwork {
    client: reqwest::Client,
    url: Url,
    config: JsonRpcNetworkConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    block_number: u64,
    contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    gas_used: u64,
    #[serde(default, deserialize_with = "deserialize_optional_u64_from_hex")]
    status: Option<u64>,
}

fn parse_hex_u64(value: &str) -> Result<u64, String> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    parse_hex_u64(&value).map_err(serde::de::Error::custom)
}

fn deserialize_optional_u64_from_hex<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|value| parse_hex_u64(&value).map_err(serde::de::Error::custom))
        .transpose()
}

impl JsonRpcNetwork {
    pub fn new(config: JsonRpcNetworkConfig) -> Result<Self, NetworkError> {
        let url = Url::parse(&config.rpc_url).map_err(|e| {
            NetworkError::Transport(format!("invalid RPC URL {}: {e}", config.rpc_url))
        })?;
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NetworkError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url,
            config,
        })
    }

    pub fn config(&self) -> &JsonRpcNetworkConfig {
        &self.config
    }

    /// Make a JSON-RPC call and deserialize the result.
    ///
    /// An `error` member in the response becomes [`NetworkError::Rejected`],
    /// carrying the node's message and the decoded revert reason when the
    /// node returns revert data.
    async fn json_rpc_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, NetworkError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .map_err(|e| NetworkError::Transport(format!("failed to send {method}: {e}")))?;

        let result: Value = response
            .json()
            .await
            .map_err(|e| NetworkError::Decode(format!("failed to parse {method} response: {e}")))?;

        if let Some(error) = result.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let reason = match error.get("data").and_then(Value::as_str) {
                Some(data) => match hex::decode(data.trim_start_matches("0x"))
                    .ok()
                    .and_then(|raw| decode_revert_reason(&raw))
                    .filter(|decoded| !decoded.is_empty())
                {
                    Some(decoded) => format!("{message}: {decoded}"),
                    None => format!("{message} ({data})"),
                },
                None => message.to_string(),
            };
            return Err(NetworkError::Rejected(reason));
        }

        let value = result
            .get("result")
            .cloned()
            .ok_or_else(|| NetworkError::Decode(format!("no result in {method} response")))?;
        serde_json::from_value(value)
            .map_err(|e| NetworkError::Decode(format!("failed to deserialize {method} result: {e}")))
    }

    async fn block_number(&self) -> Result<u64, NetworkError> {
        let number: String = self.json_rpc_call("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&number).map_err(NetworkError::Decode)
    }

    async fn fetch_receipt(&self, tx_hash: B256) -> Result<RpcReceipt, NetworkError> {
        let receipt: Option<RpcReceipt> = self
            .json_rpc_call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await?;
        let receipt = receipt.ok_or(NetworkError::Pending(tx_hash))?;

        if self.config.confirmations > 1 {
            let head = self.block_number().await?;
            if head + 1 < receipt.block_number + self.config.confirmations {
                return Err(NetworkError::Pending(tx_hash));
            }
        }
        Ok(receipt)
    }

    /// Replay a reverted transaction with `eth_call` at its block to recover
    /// the revert reason.
    async fn revert_reason(&self, request: &Value, block_number: u64) -> String {
        let replay: Result<Bytes, NetworkError> = self
            .json_rpc_call(
                "eth_call",
                vec![request.clone(), json!(format!("{block_number:#x}"))],
            )
            .await;
        match replay {
            Ok(data) => decode_revert_reason(&data)
                .filter(|reason| !reason.is_empty())
                .unwrap_or_else(|| "execution reverted".to_string()),
            Err(NetworkError::Rejected(reason)) => reason,
            Err(err) => {
                tracing::debug!(error = %err, "Failed to replay reverted transaction");
                "execution reverted".to_string()
            }
        }
    }

    /// Poll until the receipt is available and deep enough, then check its status.
    async fn wait_for_receipt(
        &self,
        tx_hash: B256,
        request: &Value,
    ) -> Result<Receipt, NetworkError> {
        let backoff = ConstantBuilder::default()
            .with_delay(self.config.poll_interval())
            .with_max_times(self.config.max_polls());

        let receipt = (|| async { self.fetch_receipt(tx_hash).await })
            .retry(backoff)
            .when(|e| matches!(e, NetworkError::Pending(_)))
            .notify(|_, delay| {
                tracing::trace!(%tx_hash, ?delay, "Receipt not available yet, polling again...");
            })
            .await
            .map_err(|e| match e {
                NetworkError::Pending(hash) => NetworkError::Timeout(hash),
                other => other,
            })?;

        if receipt.status == Some(0) {
            let reason = self.revert_reason(request, receipt.block_number).await;
            return Err(NetworkError::Reverted { tx_hash, reason });
        }

        Ok(Receipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used,
        })
    }

    async fn send_transaction(&self, request: Value) -> Result<Receipt, NetworkError> {
        let tx_hash: B256 = self
            .json_rpc_call("eth_sendTransaction", vec![request.clone()])
            .await?;
        tracing::debug!(%tx_hash, "Transaction submitted");
        self.wait_for_receipt(tx_hash, &request).await
    }
}

impl Network for JsonRpcNetwork {
    async fn accounts(&self) -> Result<Vec<Address>, NetworkError> {
        self.json_rpc_call("eth_accounts", vec![]).await
    }

    async fn deploy(&self, tx: DeployTx) -> Result<Receipt, NetworkError> {
        self.send_transaction(json!({
            "from": tx.from,
            "data": tx.init_code(),
        }))
        .await
    }

    async fn send(&self, tx: CallTx) -> Result<Receipt, NetworkError> {
        self.send_transaction(json!({
            "from": tx.from,
            "to": tx.to,
            "data": tx.data,
        }))
        .await
    }

    async fn call(&self, tx: CallTx) -> Result<Bytes, NetworkError> {
        self.json_rpc_call(
            "eth_call",
            vec![
                json!({
                    "from": tx.from,
                    "to": tx.to,
                    "data": tx.data,
                }),
                json!("latest"),
            ],
        )
        .await
    }
}
