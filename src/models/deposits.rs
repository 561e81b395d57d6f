use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};

use crate::utils::general::wei_to_eth;

/// A bridge deposit observed on L1, keyed by `deposit_id` until its L2
/// counterpart shows up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRecord {
    pub source_address: Address,
    pub destination_address: Address,
    pub value: U256,
    pub gas_limit: u64,
    pub is_creation: bool,
    pub payload: Bytes,
    pub deposit_id: B256,
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
    pub observed_at: DateTime<Utc>,
}

impl DepositRecord {
    pub fn value_eth(&self) -> f64 {
        wei_to_eth(self.value)
    }
}
