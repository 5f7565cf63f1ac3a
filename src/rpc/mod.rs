use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonrpsee::core::ClientError;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("RPC transport failure on {method}: {message}")]
    Transport {
        method: &'static str,
        message: String,
    },
    #[error("RPC call {method} timed out")]
    Timeout { method: &'static str },
    #[error("node rejected {method} (code {code}): {message}")]
    Node {
        method: &'static str,
        code: i32,
        message: String,
    },
    #[error("malformed {context} response: {message}")]
    Malformed {
        context: &'static str,
        message: String,
    },
}

impl GatewayError {
    pub fn malformed(context: &'static str, message: impl Into<String>) -> Self {
        Self::Malformed {
            context,
            message: message.into(),
        }
    }

    fn from_client(method: &'static str, err: ClientError) -> Self {
        match err {
            ClientError::Call(object) => Self::Node {
                method,
                code: object.code(),
                message: object.message().to_string(),
            },
            ClientError::RequestTimeout => Self::Timeout { method },
            ClientError::ParseError(parse) => Self::malformed(method, parse.to_string()),
            other => Self::Transport {
                method,
                message: other.to_string(),
            },
        }
    }
}

/// A single Ethereum-compatible JSON-RPC endpoint.
///
/// Implementors only provide [`ChainRpc::call`]; the typed helpers issue exactly one request
/// each and never retry. A `null` result is returned as [`Value::Null`] so callers can tell
/// "not found" apart from a failed call.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn call(&self, method: &'static str, params: Vec<Value>) -> Result<Value, GatewayError>;

    async fn block_number(&self) -> Result<u64, GatewayError> {
        let value = self.call("eth_blockNumber", vec![]).await?;
        quantity_from_value("eth_blockNumber", &value)
    }

    async fn block_by_number(&self, height: u64, full: bool) -> Result<Value, GatewayError> {
        self.call(
            "eth_getBlockByNumber",
            vec![json!(format!("{height:#x}")), json!(full)],
        )
        .await
    }

    async fn block_by_hash(&self, hash: &str, full: bool) -> Result<Value, GatewayError> {
        self.call("eth_getBlockByHash", vec![json!(hash), json!(full)])
            .await
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Value, GatewayError> {
        self.call("eth_getTransactionByHash", vec![json!(hash)]).await
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Value, GatewayError> {
        self.call("eth_getTransactionReceipt", vec![json!(hash)])
            .await
    }

    async fn balance(&self, address: &str) -> Result<Value, GatewayError> {
        self.call("eth_getBalance", vec![json!(address), json!("latest")])
            .await
    }

    async fn transaction_count(&self, address: &str, tag: &str) -> Result<Value, GatewayError> {
        self.call("eth_getTransactionCount", vec![json!(address), json!(tag)])
            .await
    }

    async fn code(&self, address: &str) -> Result<Value, GatewayError> {
        self.call("eth_getCode", vec![json!(address), json!("latest")])
            .await
    }

    async fn gas_price(&self) -> Result<Value, GatewayError> {
        self.call("eth_gasPrice", vec![]).await
    }

    async fn chain_id(&self) -> Result<u64, GatewayError> {
        let value = self.call("eth_chainId", vec![]).await?;
        quantity_from_value("eth_chainId", &value)
    }

    async fn send_raw_transaction(&self, raw_hex: &str) -> Result<String, GatewayError> {
        let value = self
            .call("eth_sendRawTransaction", vec![json!(raw_hex)])
            .await?;
        value
            .as_str()
            .filter(|hash| !hash.is_empty())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::malformed("eth_sendRawTransaction", "missing tx hash"))
    }
}

/// Decodes a `0x`-prefixed JSON-RPC quantity into a `u64`.
pub fn parse_quantity(raw: &str) -> Option<u64> {
    let digits = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))?;
    if digits.is_empty() || digits.len() > 16 {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

fn quantity_from_value(method: &'static str, value: &Value) -> Result<u64, GatewayError> {
    value
        .as_str()
        .and_then(parse_quantity)
        .ok_or_else(|| GatewayError::malformed(method, format!("expected hex quantity, got {value}")))
}

#[derive(Clone)]
pub struct RpcClient {
    inner: HttpClient,
    timeout: Duration,
}

impl RpcClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        assert!(!endpoint.is_empty(), "RPC endpoint must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .with_context(|| format!("Failed to build RPC client for {endpoint}"))?;

        Ok(Self {
            inner: client,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        assert!(
            self.timeout <= Duration::from_secs(60),
            "Timeout exceeds maximum bound"
        );
        self.timeout
    }
}

#[async_trait]
impl ChainRpc for RpcClient {
    async fn call(&self, method: &'static str, params: Vec<Value>) -> Result<Value, GatewayError> {
        let mut array = ArrayParams::new();
        for param in params {
            array
                .insert(param)
                .map_err(|err| GatewayError::malformed(method, err.to_string()))?;
        }

        debug!("RPC call {method}");
        self.inner
            .request::<Value, _>(method, array)
            .await
            .map_err(|err| GatewayError::from_client(method, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_decode_from_hex() {
        assert_eq!(parse_quantity("0x0"), Some(0));
        assert_eq!(parse_quantity("0x7b"), Some(123));
        assert_eq!(parse_quantity("0xFFFFFFFFFFFFFFFF"), Some(u64::MAX));
        assert_eq!(parse_quantity("7b"), None);
        assert_eq!(parse_quantity("0x"), None);
        assert_eq!(parse_quantity("0x1ffffffffffffffff"), None);
    }

    #[test]
    fn node_errors_keep_their_message() {
        let err = GatewayError::Node {
            method: "eth_getBalance",
            code: -32000,
            message: "header not found".to_string(),
        };
        assert!(err.to_string().contains("header not found"));
        assert!(err.to_string().contains("eth_getBalance"));
    }
}
