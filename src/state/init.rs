use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;

use crate::{
    config::Config,
    logger::Logger,
    state::{deposits::PendingDeposits, AppState},
    utils::{
        frozen::{FrozenCheck, FrozenRegistry},
        metrics::DepositMetrics,
        rpc::{ChainReader, JsonRpcClient},
    },
};

pub trait AppStateTraitInitializer {
    async fn load(logger: Logger) -> Result<Arc<Self>>;
}

impl AppStateTraitInitializer for AppState {
    async fn load(logger: Logger) -> Result<Arc<Self>> {
        let config = Config::from_env(&logger).context("invalid configuration")?;

        let l1 = Arc::new(JsonRpcClient::new(config.l1_rpc_url.clone()));
        let l2 = Arc::new(JsonRpcClient::new(config.l2_rpc_url.clone()));
        let l1_chain_id = l1
            .chain_id()
            .await
            .with_context(|| format!("could not connect to L1 at {}", l1.url()))?;
        let l2_chain_id = l2
            .chain_id()
            .await
            .with_context(|| format!("could not connect to L2 at {}", l2.url()))?;
        logger.info(format!(
            "Connected to L1 (chain id {}) and L2 (chain id {})",
            l1_chain_id, l2_chain_id
        ));

        let frozen_registry = Arc::new(FrozenRegistry::new(
            logger.clone(),
            config.frozen_contract_address,
            l1.clone(),
        ));

        Ok(Arc::new(AppState::new(
            logger,
            config,
            frozen_registry,
            l1,
            l2,
        )?))
    }
}

impl AppState {
    pub fn new(
        logger: Logger,
        config: Config,
        frozen_registry: Arc<dyn FrozenCheck>,
        l1: Arc<dyn ChainReader>,
        l2: Arc<dyn ChainReader>,
    ) -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = DepositMetrics::new(&registry).context("could not register metrics")?;
        Ok(AppState {
            logger,
            config,
            registry,
            metrics,
            pending: PendingDeposits::new(),
            frozen_registry,
            l1,
            l2,
        })
    }
}
