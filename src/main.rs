mod config;
mod logger;
mod models;
mod monitor;
mod server;
mod state;
#[cfg(test)]
mod test_utils;
mod utils;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::http::StatusCode;
use axum::Extension;
use axum::Router;
use axum_auto_routes::route;
use logger::Logger;
use monitor::{expiry::run_sweeper, l1::listen_l1_deposits, l2::L2Monitor};
use state::init::AppStateTraitInitializer;
use state::AppState;
use state::WithState;
use tower_http::cors;
use tower_http::cors::CorsLayer;
use utils::metrics::start_metrics_server;

lazy_static::lazy_static! {
    pub static ref ROUTE_REGISTRY: Mutex<Vec<Box<dyn WithState>>> = Mutex::new(Vec::new());
}

#[tokio::main]
async fn main() {
    let logger = Logger::new();
    let shared_state: Arc<AppState> = match AppState::load(logger.clone()).await {
        Ok(state) => state,
        Err(e) => {
            logger.severe(format!("startup failed: {:#}", e));
            std::process::exit(1);
        }
    };
    shared_state
        .logger
        .info(format!("starting deposit policy gateway v{}", env!("CARGO_PKG_VERSION")));

    // setup http server
    let cors = CorsLayer::new()
        .allow_headers(cors::Any)
        .allow_origin(cors::Any);
    let routes = match ROUTE_REGISTRY.lock() {
        Ok(registry) => registry.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    let app = routes
        .into_iter()
        .fold(Router::new(), |acc, r| {
            acc.merge(r.to_router(shared_state.clone()))
        })
        .layer(cors)
        .layer(Extension(shared_state.clone()));

    let server_port = shared_state.config.proxy_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], server_port));

    // spawn the server task
    let server_task = tokio::spawn(async move {
        axum::Server::try_bind(&addr)
            .with_context(|| format!("could not bind gateway on {addr}"))?
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .context("gateway server stopped")
    });
    shared_state.logger.info(format!(
        "server: listening on http://0.0.0.0:{}",
        server_port
    ));

    let metrics_task = tokio::spawn(start_metrics_server(
        shared_state.logger.clone(),
        shared_state.registry.clone(),
        shared_state.config.metrics_port,
    ));

    let l1_task = tokio::spawn(listen_l1_deposits(shared_state.clone()));
    let l2_task = tokio::spawn(L2Monitor::new().run(shared_state.clone()));

    let sweeper_task = tokio::spawn({
        let state = shared_state.clone();
        async move {
            match state.config.pending_deposit_ttl {
                Some(ttl) => run_sweeper(state, ttl).await,
                None => std::future::pending::<()>().await,
            }
        }
    });

    // any long-running task ending stops the program
    let outcome = tokio::select! {
        res = server_task => ("gateway server", res),
        res = metrics_task => ("metrics server", res),
        res = l1_task => ("L1 listener", res),
        res = l2_task => ("L2 poller", res.map(Ok)),
        res = sweeper_task => ("pending deposit sweeper", res.map(Ok)),
    };
    match outcome {
        (task, Ok(Ok(()))) => shared_state.logger.severe(format!("{} stopped", task)),
        (task, Ok(Err(e))) => shared_state
            .logger
            .severe(format!("{} failed: {:#}", task, e)),
        (task, Err(e)) => shared_state
            .logger
            .severe(format!("{} panicked: {}", task, e)),
    }
    std::process::exit(1);
}

#[route(get, "/")]
async fn root() -> (StatusCode, String) {
    (
        StatusCode::ACCEPTED,
        format!("server v{}", env!("CARGO_PKG_VERSION")),
    )
}
