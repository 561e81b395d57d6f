use std::sync::Arc;

use axum::{body::Body, Router};
use prometheus::Registry;

use crate::{
    config::Config,
    logger::Logger,
    utils::{frozen::FrozenCheck, metrics::DepositMetrics, rpc::ChainReader},
};

macro_rules! impl_with_lock {
    ($vis:vis $name:ident, $field:ident, $type:ty) => {
        $vis async fn $name<F, R>(&self, f: F) -> R
        where
            F: FnOnce(&mut $type) -> R,
        {
            let mut guard = self.$field.write().await;
            f(&mut guard)
        }

        paste::paste! {
            $vis async fn [<$name _read>]<F, R>(&self, f: F) -> R
            where
                F: FnOnce(&$type) -> R,
            {
                let guard = self.$field.read().await;
                f(&guard)
            }
        }
    };
}

pub mod deposits;
pub mod init;

use deposits::PendingDeposits;

pub struct AppState {
    pub logger: Logger,
    pub config: Config,
    pub registry: Arc<Registry>,
    pub metrics: DepositMetrics,
    pub pending: PendingDeposits,
    pub frozen_registry: Arc<dyn FrozenCheck>,
    pub l1: Arc<dyn ChainReader>,
    pub l2: Arc<dyn ChainReader>,
}

// required for axum_auto_routes
pub trait WithState: Send {
    fn to_router(self: Box<Self>, shared_state: Arc<AppState>) -> Router;

    fn box_clone(&self) -> Box<dyn WithState>;
}

impl WithState for Router<Arc<AppState>, Body> {
    fn to_router(self: Box<Self>, shared_state: Arc<AppState>) -> Router {
        self.with_state(shared_state)
    }

    fn box_clone(&self) -> Box<dyn WithState> {
        Box::new((*self).clone())
    }
}

impl Clone for Box<dyn WithState> {
    fn clone(&self) -> Box<dyn WithState> {
        self.box_clone()
    }
}

impl AppState {
    /// Publish the store size on the pending gauge.
    pub fn set_pending_gauge(&self, len: usize) {
        self.metrics
            .pending_deposits
            .set(i64::try_from(len).unwrap_or(i64::MAX));
    }
}
