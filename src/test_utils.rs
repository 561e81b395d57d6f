use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use alloy::primitives::{Address, B256};
use async_trait::async_trait;

use crate::{
    config::tests::test_config,
    logger::Logger,
    models::blocks::{BlockTransaction, BlockWithTransactions},
    state::AppState,
    utils::{
        frozen::{FrozenCheck, OracleError},
        rpc::{ChainReader, RpcError},
    },
};

/// In-memory chain. Unknown blocks come back as `None`, blocks marked as
/// failing return an RPC error.
#[derive(Default)]
pub struct FakeChain {
    head: Mutex<Option<u64>>,
    blocks: Mutex<HashMap<u64, BlockWithTransactions>>,
    failing: Mutex<HashSet<u64>>,
    requested: Mutex<Vec<u64>>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head(&self, number: u64) {
        *self.head.lock().unwrap() = Some(number);
    }

    pub fn add_block(&self, number: u64, timestamp: u64, tx_hashes: &[B256]) {
        let transactions = tx_hashes
            .iter()
            .map(|hash| BlockTransaction::Full { hash: *hash })
            .collect();
        self.blocks.lock().unwrap().insert(
            number,
            BlockWithTransactions {
                number,
                timestamp,
                transactions,
            },
        );
    }

    pub fn fail_block(&self, number: u64) {
        self.failing.lock().unwrap().insert(number);
    }

    pub fn heal_block(&self, number: u64) {
        self.failing.lock().unwrap().remove(&number);
    }

    /// Block numbers passed to `block_with_transactions`, in call order.
    pub fn requested(&self) -> Vec<u64> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.head
            .lock()
            .unwrap()
            .ok_or_else(|| RpcError::MissingResult("eth_blockNumber".to_string()))
    }

    async fn block_timestamp(&self, number: u64) -> Result<u64, RpcError> {
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .map(|block| block.timestamp)
            .ok_or_else(|| RpcError::MissingResult(format!("block {number}")))
    }

    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> Result<Option<BlockWithTransactions>, RpcError> {
        self.requested.lock().unwrap().push(number);
        if self.failing.lock().unwrap().contains(&number) {
            return Err(RpcError::Remote {
                method: "eth_getBlockByNumber".to_string(),
                code: -32000,
                message: "header not found".to_string(),
            });
        }
        Ok(self.blocks.lock().unwrap().get(&number).cloned())
    }
}

/// Oracle answering from a fixed frozen set, or failing every call.
#[derive(Default)]
pub struct FakeOracle {
    frozen: HashSet<Address>,
    unavailable: bool,
    calls: AtomicUsize,
}

impl FakeOracle {
    pub fn freezing(accounts: &[Address]) -> Self {
        FakeOracle {
            frozen: accounts.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        FakeOracle {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrozenCheck for FakeOracle {
    async fn is_frozen(&self, account: Address) -> Result<bool, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(OracleError::NoContractFound(Address::ZERO));
        }
        Ok(self.frozen.contains(&account))
    }
}

pub fn test_state(
    l1_url: &str,
    oracle: Arc<FakeOracle>,
    l1: Arc<FakeChain>,
    l2: Arc<FakeChain>,
) -> Arc<AppState> {
    Arc::new(AppState::new(Logger::new(), test_config(l1_url), oracle, l1, l2).unwrap())
}
