//! Solana JSON-RPC chain client.
//!
//! Speaks `getTransaction` against a devnet (or any) RPC endpoint and maps
//! the response into `ChainTransaction`. Read-only — this crate never signs
//! or submits anything.

use async_trait::async_trait;
use serde::Deserialize;

use tidings_core::{Result, TidingsError};

use crate::chain::{ChainClient, ChainTransaction};

pub const DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";

/// reqwest-based Solana RPC client.
pub struct SolanaRpc {
    endpoint: String,
    client: reqwest::Client,
}

impl SolanaRpc {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn devnet() -> Self {
        Self::new(DEVNET_RPC_URL)
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<RpcTransaction>,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RpcTransaction {
    meta: RpcMeta,
    transaction: RpcTransactionBody,
}

#[derive(Deserialize)]
struct RpcMeta {
    err: Option<serde_json::Value>,
    #[serde(rename = "preBalances")]
    pre_balances: Vec<u64>,
    #[serde(rename = "postBalances")]
    post_balances: Vec<u64>,
}

#[derive(Deserialize)]
struct RpcTransactionBody {
    message: RpcMessage,
}

#[derive(Deserialize)]
struct RpcMessage {
    #[serde(rename = "accountKeys")]
    account_keys: Vec<String>,
}

#[async_trait]
impl ChainClient for SolanaRpc {
    async fn get_transaction(&self, reference: &str) -> Result<Option<ChainTransaction>> {
        // maxSupportedTransactionVersion: 0 is required for modern
        // transactions; "confirmed" keeps the poll loop from waiting on
        // finalization.
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTransaction",
            "params": [reference, {
                "encoding": "json",
                "commitment": "confirmed",
                "maxSupportedTransactionVersion": 0
            }]
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| TidingsError::Chain(format!("RPC send: {e}")))?;

        let parsed: RpcResponse = resp
            .json()
            .await
            .map_err(|e| TidingsError::Chain(format!("RPC decode: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(TidingsError::Chain(format!("RPC error: {err}")));
        }

        Ok(parsed.result.map(|tx| ChainTransaction {
            err: tx.meta.err.map(|e| e.to_string()),
            account_keys: tx.transaction.message.account_keys,
            pre_balances: tx.meta.pre_balances,
            post_balances: tx.meta.post_balances,
        }))
    }
}
