use std::sync::Arc;

use alloy::primitives::Address;
use axum::{
    body::{Bytes, StreamBody},
    extract::State,
    http::{
        header::{self, HeaderName, HeaderValue},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
};
use axum_auto_routes::route;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    models::rpc::{LogView, RpcEnvelope},
    state::AppState,
    utils::{
        events::{decode_deposit_data, DEPOSIT_EVENT_SIGNATURE},
        frozen::{check_frozen, PolicyErrorMode, PolicyVerdict},
        general::wei_to_eth,
        rpc::HTTP_CLIENT,
    },
};

pub const BLOCK_RECEIPTS_METHOD: &str = "eth_getBlockReceipts";

/// A log the oracle cannot vouch for is not returned to the client.
pub const GATEWAY_POLICY: PolicyErrorMode = PolicyErrorMode::FailClosed;

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid JSON")]
    BadRequest(#[source] serde_json::Error),
    #[error("Ethereum RPC request failed")]
    Upstream(#[source] reqwest::Error),
    #[error("Could not read response")]
    UpstreamRead(#[source] reqwest::Error),
    #[error("Could not parse response as JSON")]
    UpstreamParse(#[source] serde_json::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(_) | GatewayError::UpstreamParse(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::UpstreamRead(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

#[route(post, "/")]
pub async fn json_rpc_gateway(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    state.logger.info("JSON-RPC request received");
    let res = route_request(&state, body).await;
    if let Err(e) = &res {
        match std::error::Error::source(e) {
            Some(source) => state.logger.severe(format!("{}: {}", e, source)),
            None => state.logger.severe(e.to_string()),
        }
    }
    res
}

async fn route_request(state: &AppState, body: Bytes) -> Result<Response, GatewayError> {
    // batches and other non-object payloads are rejected here
    let request: Map<String, Value> =
        serde_json::from_slice(&body).map_err(GatewayError::BadRequest)?;
    let envelope: RpcEnvelope =
        serde_json::from_value(Value::Object(request)).map_err(GatewayError::BadRequest)?;

    if envelope.method() == Some(BLOCK_RECEIPTS_METHOD) {
        return block_receipts(state, body).await;
    }

    let upstream = forward(state, body).await?;
    state.logger.info("JSON-RPC request successfully forwarded");
    Ok(stream_response(upstream))
}

async fn forward(state: &AppState, body: Bytes) -> Result<reqwest::Response, GatewayError> {
    HTTP_CLIENT
        .post(&state.config.l1_rpc_url)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(GatewayError::Upstream)
}

/// Pass the upstream answer through as it arrives. Status and end-to-end
/// headers are kept, the content type is always JSON.
fn stream_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if is_hop_by_hop(name) || name == header::CONTENT_LENGTH || name == header::CONTENT_TYPE {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    (status, headers, StreamBody::new(upstream.bytes_stream())).into_response()
}

async fn block_receipts(state: &AppState, body: Bytes) -> Result<Response, GatewayError> {
    state
        .logger
        .info("Processing eth_getBlockReceipts request...");
    let upstream = forward(state, body).await?;
    let raw = upstream
        .bytes()
        .await
        .map_err(GatewayError::UpstreamRead)?;
    let mut response: Value =
        serde_json::from_slice(&raw).map_err(GatewayError::UpstreamParse)?;

    let dropped = filter_block_receipts(state, &mut response).await;

    let filtered = match serde_json::to_vec(&response) {
        Ok(filtered) => filtered,
        Err(e) => {
            state
                .logger
                .severe(format!("Could not serialize filtered receipts: {}", e));
            Vec::new()
        }
    };
    state.logger.info(format!(
        "Frozen accounts filtered ({} logs removed) and response forwarded.",
        dropped
    ));
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        filtered,
    )
        .into_response())
}

/// Remove deposit logs of frozen senders from every receipt in `result`.
/// Returns the number of logs removed.
pub async fn filter_block_receipts(state: &AppState, response: &mut Value) -> usize {
    let Some(receipts) = response.get_mut("result").and_then(Value::as_array_mut) else {
        return 0;
    };

    let mut dropped = 0;
    for receipt in receipts.iter_mut() {
        let Some(logs) = receipt.get_mut("logs").and_then(Value::as_array_mut) else {
            continue;
        };
        for entry in std::mem::take(logs) {
            if keep_log(state, &entry).await {
                logs.push(entry);
            } else {
                dropped += 1;
            }
        }
    }
    dropped
}

async fn keep_log(state: &AppState, entry: &Value) -> bool {
    let Ok(view) = LogView::deserialize(entry) else {
        return true;
    };
    if view.topics.first() != Some(&DEPOSIT_EVENT_SIGNATURE) {
        return true;
    }
    let Some(from_topic) = view.topics.get(1) else {
        return true;
    };
    let account = Address::from_word(*from_topic);

    let verdict = check_frozen(state.frozen_registry.as_ref(), account).await;
    match &verdict {
        PolicyVerdict::Unavailable(e) => {
            state
                .logger
                .severe(format!("Frozen address check error for {}: {}", account, e));
        }
        PolicyVerdict::Frozen => {
            state
                .logger
                .info(format!("Frozen account found: {}", account));
            state
                .metrics
                .blocked_deposits
                .with_label_values(&[&account.to_string()])
                .inc();
        }
        PolicyVerdict::Clear => {}
    }
    if verdict.is_blocked(GATEWAY_POLICY) {
        return false;
    }

    if let Some(deposit) = view.data_bytes().as_deref().and_then(decode_deposit_data) {
        let value_eth = wei_to_eth(deposit.value);
        state.logger.info(format!(
            "Deposit monitored: {} -> Value: {:.6} ETH, Gas: {}",
            account, value_eth, deposit.gas_limit
        ));
        state.metrics.deposit_value.observe(value_eth);
    }
    true
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, Bytes as AlloyBytes, U256};
    use axum::body::HttpBody;
    use mockito::Matcher;
    use serde_json::json;

    use super::*;
    use crate::{
        test_utils::{test_state, FakeChain, FakeOracle},
        utils::events::tests::encode_data,
    };

    const FROZEN: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
    const CLEAR: Address = address!("90F79bf6EB2c4f870365E785982E1f101E93b906");

    fn state_for(url: &str, oracle: FakeOracle) -> (Arc<AppState>, Arc<FakeOracle>) {
        let oracle = Arc::new(oracle);
        let state = test_state(
            url,
            oracle.clone(),
            Arc::new(FakeChain::new()),
            Arc::new(FakeChain::new()),
        );
        (state, oracle)
    }

    async fn body_string(response: Response) -> String {
        let mut body = response.into_body();
        let mut out = Vec::new();
        while let Some(chunk) = body.data().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        String::from_utf8(out).unwrap()
    }

    fn deposit_entry(from: Address, log_index: u64) -> Value {
        let data = encode_data(
            U256::from(2_000_000_000_000_000_000u128),
            50_000,
            false,
            &[],
        );
        json!({
            "address": "0xbeb5fc579115071764c7423a4f12edde41f106ed",
            "topics": [
                DEPOSIT_EVENT_SIGNATURE,
                from.into_word(),
                CLEAR.into_word()
            ],
            "data": AlloyBytes::from(data),
            "blockNumber": "0xc",
            "logIndex": format!("0x{:x}", log_index)
        })
    }

    fn transfer_entry() -> Value {
        json!({
            "address": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "topics": [
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                FROZEN.into_word()
            ],
            "data": "0x",
            "blockNumber": "0xc",
            "logIndex": "0x9"
        })
    }

    fn receipts_response() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": [
                {
                    "transactionHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
                    "logs": [deposit_entry(FROZEN, 0), transfer_entry(), deposit_entry(CLEAR, 1)]
                },
                {
                    "transactionHash": "0x3333333333333333333333333333333333333333333333333333333333333333",
                    "logs": []
                }
            ]
        })
    }

    #[tokio::test]
    async fn test_frozen_deposit_log_removed() {
        let (state, _) = state_for("http://localhost:8545", FakeOracle::freezing(&[FROZEN]));
        let mut response = receipts_response();

        assert_eq!(filter_block_receipts(&state, &mut response).await, 1);
        assert_eq!(
            response["result"][0]["logs"],
            json!([transfer_entry(), deposit_entry(CLEAR, 1)])
        );
        assert_eq!(response["result"][1], receipts_response()["result"][1]);
        assert_eq!(
            state
                .metrics
                .blocked_deposits
                .with_label_values(&[&FROZEN.to_string()])
                .get(),
            1
        );
        assert_eq!(state.metrics.deposit_value.get_sample_count(), 1);
        // receipts filtering never touches deposit tracking
        assert_eq!(state.metrics.total_deposits.get(), 0);
        assert_eq!(state.pending.len().await, 0);
    }

    #[tokio::test]
    async fn test_oracle_failure_drops_deposit_logs() {
        let (state, oracle) = state_for("http://localhost:8545", FakeOracle::unavailable());
        let mut response = receipts_response();

        assert_eq!(filter_block_receipts(&state, &mut response).await, 2);
        assert_eq!(response["result"][0]["logs"], json!([transfer_entry()]));
        assert_eq!(oracle.calls(), 2);
        assert_eq!(
            state
                .metrics
                .blocked_deposits
                .with_label_values(&[&FROZEN.to_string()])
                .get(),
            0
        );
    }

    #[tokio::test]
    async fn test_non_list_result_untouched() {
        let (state, oracle) = state_for("http://localhost:8545", FakeOracle::unavailable());
        let mut response = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "invalid block" }
        });
        let original = response.clone();

        assert_eq!(filter_block_receipts(&state, &mut response).await, 0);
        assert_eq!(response, original);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_deposit_without_sender_topic_kept() {
        let (state, oracle) = state_for("http://localhost:8545", FakeOracle::unavailable());
        let entry = json!({ "topics": [DEPOSIT_EVENT_SIGNATURE], "data": "0x" });
        let mut response = json!({ "result": [{ "logs": [entry.clone()] }] });

        assert_eq!(filter_block_receipts(&state, &mut response).await, 0);
        assert_eq!(response["result"][0]["logs"], json!([entry]));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_block_receipts_request_filtered() {
        let mut server = mockito::Server::new_async().await;
        let request = r#"{"jsonrpc":"2.0","method":"eth_getBlockReceipts","params":["0xc"],"id":1}"#;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::Exact(request.to_string()))
            .with_header("content-type", "text/plain")
            .with_body(receipts_response().to_string())
            .create_async()
            .await;
        let (state, _) = state_for(&server.url(), FakeOracle::freezing(&[FROZEN]));

        let response = json_rpc_gateway(State(state), Bytes::from(request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(
            body["result"][0]["logs"],
            json!([transfer_entry(), deposit_entry(CLEAR, 1)])
        );
        // key order of the upstream answer is preserved
        let keys: Vec<&String> = body.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["jsonrpc", "id", "result"]);
    }

    #[tokio::test]
    async fn test_other_methods_forwarded_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let request = r#"{"jsonrpc":"2.0","method":"eth_chainId","params":[],"id":7}"#;
        let upstream_body = r#"{"jsonrpc":"2.0","id":7,"result":"0xa"}"#;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::Exact(request.to_string()))
            .with_status(429)
            .with_header("content-type", "text/plain")
            .with_header("x-ratelimit-remaining", "0")
            .with_body(upstream_body)
            .create_async()
            .await;
        let (state, oracle) = state_for(&server.url(), FakeOracle::unavailable());

        let response = json_rpc_gateway(State(state), Bytes::from(request))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(body_string(response).await, upstream_body);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let (state, _) = state_for("http://127.0.0.1:1", FakeOracle::default());

        for body in ["not json", r#"[{"method":"eth_chainId"}]"#, "42"] {
            let err = json_rpc_gateway(State(state.clone()), Bytes::from(body))
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::BadRequest(_)));
            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let (state, _) = state_for("http://127.0.0.1:1", FakeOracle::default());
        let err = json_rpc_gateway(
            State(state),
            Bytes::from(r#"{"jsonrpc":"2.0","method":"eth_blockNumber","id":1}"#),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_unparsable_upstream_answer() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_body("<html>bad gateway</html>")
            .create_async()
            .await;
        let (state, _) = state_for(&server.url(), FakeOracle::default());

        let err = json_rpc_gateway(
            State(state),
            Bytes::from(r#"{"jsonrpc":"2.0","method":"eth_getBlockReceipts","params":["latest"],"id":1}"#),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamParse(_)));
    }
}
