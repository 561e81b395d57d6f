use alloy::{hex, primitives::B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Inbound JSON-RPC 2.0 call as seen by the gateway. Only `method` drives
/// routing; the raw body is what gets forwarded.
#[derive(Debug, Deserialize)]
pub struct RpcEnvelope {
    #[serde(default)]
    pub method: Option<Value>,
}

impl RpcEnvelope {
    pub fn method(&self) -> Option<&str> {
        self.method.as_ref().and_then(Value::as_str)
    }
}

/// Typed look at one receipt log entry. The entry itself is forwarded
/// untouched, this view is only used to decide whether to keep it.
#[derive(Debug, Deserialize)]
pub struct LogView {
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Option<String>,
}

impl LogView {
    /// Raw data bytes, `None` when absent or not valid hex.
    pub fn data_bytes(&self) -> Option<Vec<u8>> {
        self.data.as_deref().and_then(|data| hex::decode(data).ok())
    }
}
