use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{http::StatusCode, routing::get, Extension, Router};
use prometheus::{
    exponential_buckets, register_counter_with_registry, register_histogram_with_registry,
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Counter, Encoder, Histogram, IntCounter, IntCounterVec,
    IntGauge, Registry, TextEncoder,
};

use crate::logger::Logger;

const GAS_LIMIT_BUCKETS: &[f64] = &[
    21_000., 50_000., 100_000., 200_000., 500_000., 1_000_000., 2_000_000., 5_000_000.,
];

const CONFIRMATION_LATENCY_SEC_BUCKETS: &[f64] = &[
    1., 2., 5., 10., 30., 60., 120., 180., 300., 600., 900., 1800., 3600.,
];

#[derive(Clone, Debug)]
pub struct DepositMetrics {
    pub total_deposits: IntCounter,
    pub blocked_deposits: IntCounterVec,
    pub deposits_by_account: IntCounterVec,
    /// Sum of recorded deposit values, in ETH.
    pub deposit_value_total: Counter,
    pub deposit_value: Histogram,
    pub deposit_gas_limit: Histogram,
    pub l2_confirmation_latency: Histogram,
    pub pending_deposits: IntGauge,
    pub pending_deposits_expired: IntCounter,
}

impl DepositMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            total_deposits: register_int_counter_with_registry!(
                "opstack_total_deposits",
                "Total number of deposits recorded on L1",
                registry,
            )?,
            blocked_deposits: register_int_counter_vec_with_registry!(
                "opstack_blocked_deposits",
                "Number of deposits blocked because the sender is frozen, by account",
                &["account"],
                registry,
            )?,
            deposits_by_account: register_int_counter_vec_with_registry!(
                "opstack_deposits_by_account",
                "Number of recorded deposits, by sending account",
                &["account"],
                registry,
            )?,
            deposit_value_total: register_counter_with_registry!(
                "opstack_deposit_value_total",
                "Total value of recorded deposits in ETH",
                registry,
            )?,
            deposit_value: register_histogram_with_registry!(
                "opstack_deposit_value",
                "Distribution of deposit values in ETH",
                exponential_buckets(0.001, 10.0, 7)?,
                registry,
            )?,
            deposit_gas_limit: register_histogram_with_registry!(
                "opstack_deposit_gas_limit",
                "Distribution of deposit gas limits",
                GAS_LIMIT_BUCKETS.to_vec(),
                registry,
            )?,
            l2_confirmation_latency: register_histogram_with_registry!(
                "opstack_l2_confirmation_latency_seconds",
                "Time between a deposit on L1 and its confirmation on L2",
                CONFIRMATION_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )?,
            pending_deposits: register_int_gauge_with_registry!(
                "opstack_pending_deposits",
                "Number of deposits waiting for L2 confirmation",
                registry,
            )?,
            pending_deposits_expired: register_int_counter_with_registry!(
                "opstack_pending_deposits_expired",
                "Number of pending deposits dropped after exceeding their TTL",
                registry,
            )?,
        })
    }
}

async fn metrics_handler(Extension(registry): Extension<Arc<Registry>>) -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub fn metrics_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(Extension(registry))
}

/// Serve `GET /metrics` until the server fails.
pub async fn start_metrics_server(
    logger: Logger,
    registry: Arc<Registry>,
    port: u16,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    logger.info(format!(
        "metrics: listening on http://0.0.0.0:{}/metrics",
        port
    ));
    axum::Server::try_bind(&addr)
        .with_context(|| format!("could not bind metrics server on {addr}"))?
        .serve(metrics_router(registry).into_make_service())
        .await
        .context("metrics server stopped")
}
