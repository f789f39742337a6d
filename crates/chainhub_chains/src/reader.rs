//! Balance read collaborator -- native balance of one account on one endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::account::AccountId;
use crate::registry::ChainId;
use crate::units::hex_quantity_to_decimal;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Why a single endpoint read failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("Timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ReadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BalanceReader: Send + Sync {
    /// Native balance of `account` in the smallest denomination, as an
    /// unsigned decimal string.
    async fn read_balance(
        &self,
        endpoint: &str,
        account: &AccountId,
        chain_id: ChainId,
    ) -> Result<String, ReadError>;
}

// ---------------------------------------------------------------------------
// JSON-RPC wire types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: [&'a str; 2],
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

// ---------------------------------------------------------------------------
// JsonRpcBalanceReader
// ---------------------------------------------------------------------------

/// `eth_getBalance` over HTTP JSON-RPC.
pub struct JsonRpcBalanceReader {
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcBalanceReader {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for JsonRpcBalanceReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalanceReader for JsonRpcBalanceReader {
    async fn read_balance(
        &self,
        endpoint: &str,
        account: &AccountId,
        chain_id: ChainId,
    ) -> Result<String, ReadError> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "eth_getBalance",
            params: [account.as_str(), "latest"],
        };

        debug!(chain_id, id = body.id, "eth_getBalance");
        let response = self.client.post(endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReadError::Transport(format!("HTTP {status}")));
        }

        let value: Value = response.json().await?;
        parse_balance_response(&value)
    }
}

/// Extract the balance from a JSON-RPC response body.
pub fn parse_balance_response(value: &Value) -> Result<String, ReadError> {
    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        let err: RpcErrorObject = serde_json::from_value(err.clone())
            .map_err(|e| ReadError::InvalidResponse(format!("malformed error object: {e}")))?;
        return Err(ReadError::Rpc {
            code: err.code,
            message: err.message,
        });
    }

    let quantity = value
        .get("result")
        .and_then(Value::as_str)
        .ok_or_else(|| ReadError::InvalidResponse("missing result".into()))?;

    hex_quantity_to_decimal(quantity)
        .ok_or_else(|| ReadError::InvalidResponse(format!("not a hex quantity: {quantity}")))
}
