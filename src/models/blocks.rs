use alloy::primitives::B256;
use serde::Deserialize;

use crate::utils::general::deserialize_hex_u64;

/// Header fields we need from `eth_getBlockByNumber(n, false)`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeader {
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub timestamp: u64,
}

/// `eth_getBlockByNumber(n, true)` reduced to what confirmation matching
/// reads.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockWithTransactions {
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub number: u64,
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: Vec<BlockTransaction>,
}

/// Nodes return full objects when asked to, but some L2 nodes fall back
/// to bare hashes for system transactions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BlockTransaction {
    Full { hash: B256 },
    Hash(B256),
}

impl BlockTransaction {
    pub fn hash(&self) -> B256 {
        match self {
            BlockTransaction::Full { hash } => *hash,
            BlockTransaction::Hash(hash) => *hash,
        }
    }
}
