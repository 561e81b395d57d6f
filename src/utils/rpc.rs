use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::{
    models::{
        blocks::{BlockHeader, BlockWithTransactions},
        rpc::{JsonRpcRequest, JsonRpcResponse},
    },
    utils::general::hex_to_u64,
};

lazy_static::lazy_static! {
    pub static ref HTTP_CLIENT: Client = Client::builder()
        .timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to create HTTP client");
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("request to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("endpoint returned HTTP {0}")]
    Status(StatusCode),
    #[error("could not decode {method} response: {reason}")]
    Decode { method: String, reason: String },
    #[error("{method} failed with code {code}: {message}")]
    Remote {
        method: String,
        code: i64,
        message: String,
    },
    #[error("{0} returned no result")]
    MissingResult(String),
}

/// Block reads shared by the deposit decoder (L1 header lookups) and the
/// confirmation poller (L2 scans).
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Timestamp (unix seconds) of the block header at `number`.
    async fn block_timestamp(&self, number: u64) -> Result<u64, RpcError>;

    /// Full block with transaction objects, `None` if the node does not
    /// know the block yet.
    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<BlockWithTransactions>, RpcError>;
}

pub struct JsonRpcClient {
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        JsonRpcClient {
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one call and decode its `result`. A JSON `null` result is
    /// returned as `None`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let res = HTTP_CLIENT
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .json(&JsonRpcRequest::new(id, method, params))
            .send()
            .await
            .map_err(|source| RpcError::Connection {
                url: self.url.clone(),
                source,
            })?;

        if !res.status().is_success() {
            return Err(RpcError::Status(res.status()));
        }

        let body = res.bytes().await.map_err(|source| RpcError::Connection {
            url: self.url.clone(),
            source,
        })?;
        let response: JsonRpcResponse<T> =
            serde_json::from_slice(&body).map_err(|e| RpcError::Decode {
                method: method.to_string(),
                reason: e.to_string(),
            })?;

        if let Some(error) = response.error {
            return Err(RpcError::Remote {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result)
    }

    async fn request_quantity(&self, method: &str, params: Value) -> Result<u64, RpcError> {
        let quantity: String = self
            .request(method, params)
            .await?
            .ok_or_else(|| RpcError::MissingResult(method.to_string()))?;
        hex_to_u64(&quantity).map_err(|e| RpcError::Decode {
            method: method.to_string(),
            reason: format!("invalid quantity {quantity}: {e}"),
        })
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        self.request_quantity("eth_chainId", json!([])).await
    }

    pub async fn get_code(&self, address: Address) -> Result<Bytes, RpcError> {
        Ok(self
            .request::<Bytes>("eth_getCode", json!([address, "latest"]))
            .await?
            .unwrap_or_default())
    }

    /// Read-only contract call against the latest block.
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        Ok(self
            .request::<Bytes>("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?
            .unwrap_or_default())
    }

    pub async fn header_by_number(&self, number: u64) -> Result<Option<BlockHeader>, RpcError> {
        self.request(
            "eth_getBlockByNumber",
            json!([format!("0x{:x}", number), false]),
        )
        .await
    }
}

#[async_trait]
impl ChainReader for JsonRpcClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.request_quantity("eth_blockNumber", json!([])).await
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, RpcError> {
        self.header_by_number(number)
            .await?
            .map(|header| header.timestamp)
            .ok_or_else(|| RpcError::MissingResult(format!("eth_getBlockByNumber({number})")))
    }

    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<BlockWithTransactions>, RpcError> {
        self.request(
            "eth_getBlockByNumber",
            json!([format!("0x{:x}", number), true]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use mockito::Matcher;

    use super::*;

    #[tokio::test]
    async fn test_block_number() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_blockNumber" })))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
            .create_async()
            .await;

        let client = JsonRpcClient::new(server.url());
        assert_eq!(client.block_number().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_remote_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_body(
                r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"header not found"}}"#,
            )
            .create_async()
            .await;

        let client = JsonRpcClient::new(server.url());
        match client.block_timestamp(5).await {
            Err(RpcError::Remote { code, message, .. }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "header not found");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_status(503)
            .create_async()
            .await;

        let client = JsonRpcClient::new(server.url());
        assert!(matches!(
            client.chain_id().await,
            Err(RpcError::Status(StatusCode::SERVICE_UNAVAILABLE))
        ));
    }

    #[tokio::test]
    async fn test_null_block_is_none() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "eth_getBlockByNumber",
                "params": ["0xb", true]
            })))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":null}"#)
            .create_async()
            .await;

        let client = JsonRpcClient::new(server.url());
        assert!(client.block_with_transactions(11).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_code_sends_address() {
        let mut server = mockito::Server::new_async().await;
        let registry = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "method": "eth_getCode",
                "params": ["0x5fbdb2315678afecb367f032d93f642f64180aa3", "latest"]
            })))
            .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x6080"}"#)
            .create_async()
            .await;

        let client = JsonRpcClient::new(server.url());
        let code = client.get_code(registry).await.unwrap();
        assert_eq!(code.to_vec(), vec![0x60u8, 0x80]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let client = JsonRpcClient::new("http://127.0.0.1:1");
        assert!(matches!(
            client.block_number().await,
            Err(RpcError::Connection { .. })
        ));
    }
}
