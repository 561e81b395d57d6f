use alloy::{
    primitives::{b256, Address, Bytes, B256, U256},
    rpc::types::Log,
};
use chrono::Utc;
use thiserror::Error;

use crate::{
    models::deposits::DepositRecord,
    utils::{general::unix_to_datetime, rpc::ChainReader},
};

/// topic0 of the portal's `TransactionDeposited` event.
pub const DEPOSIT_EVENT_SIGNATURE: B256 =
    b256!("35d79ab81f2b2017e19afb5c5571778877782d7a8786f5907f93b0f4702f4f23");

const WORD: usize = 32;
const MIN_DATA_LEN: usize = 3 * WORD;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("insufficient number of topics: {topics}")]
    MalformedEvent { topics: usize },
    #[error("log has no {0}")]
    MissingProvenance(&'static str),
}

/// Non-indexed part of a deposit event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositData {
    pub value: U256,
    pub gas_limit: u64,
    pub is_creation: bool,
    pub payload: Bytes,
}

fn word(data: &[u8], index: usize) -> Option<&[u8]> {
    data.get(index * WORD..(index + 1) * WORD)
}

fn word_as_usize(data: &[u8], index: usize) -> Option<usize> {
    let value = U256::from_be_slice(word(data, index)?);
    usize::try_from(value).ok()
}

/// Dynamic `bytes` tail pointed to by the fourth head word. Anything out of
/// range yields an empty payload.
fn decode_payload(data: &[u8]) -> Bytes {
    let Some(offset) = word_as_usize(data, 3) else {
        return Bytes::new();
    };
    let Some(len_word) = data.get(offset..offset.saturating_add(WORD)) else {
        return Bytes::new();
    };
    let Ok(len) = usize::try_from(U256::from_be_slice(len_word)) else {
        return Bytes::new();
    };
    let start = offset + WORD;
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .map(Bytes::copy_from_slice)
        .unwrap_or_default()
}

/// Decode the data segment. Returns `None` below three words, in which case
/// callers keep zero values.
pub fn decode_deposit_data(data: &[u8]) -> Option<DepositData> {
    if data.len() < MIN_DATA_LEN {
        return None;
    }
    let value = U256::from_be_slice(word(data, 0)?);
    // gasLimit is a uint64 padded to a word; only the low 8 bytes are used
    let gas_bytes: [u8; 8] = word(data, 1)?[WORD - 8..].try_into().ok()?;
    let is_creation = word(data, 2)?.iter().any(|b| *b != 0);

    Some(DepositData {
        value,
        gas_limit: u64::from_be_bytes(gas_bytes),
        is_creation,
        payload: decode_payload(data),
    })
}

/// Turn a portal log into a `DepositRecord`. The block header is looked up
/// for `observed_at`, falling back to the current time.
pub async fn decode_deposit_event(
    chain: &dyn ChainReader,
    log: &Log,
) -> Result<DepositRecord, DecodeError> {
    let topics = log.topics();
    if topics.len() < 3 {
        return Err(DecodeError::MalformedEvent {
            topics: topics.len(),
        });
    }

    let deposit_id = match topics.get(3) {
        Some(hash) => *hash,
        None => log
            .transaction_hash
            .ok_or(DecodeError::MissingProvenance("transaction hash"))?,
    };
    let block_number = log
        .block_number
        .ok_or(DecodeError::MissingProvenance("block number"))?;

    let data = decode_deposit_data(&log.data().data).unwrap_or_default();

    let observed_at = match chain.block_timestamp(block_number).await {
        Ok(timestamp) => unix_to_datetime(timestamp),
        Err(_) => Utc::now(),
    };

    Ok(DepositRecord {
        source_address: Address::from_word(topics[1]),
        destination_address: Address::from_word(topics[2]),
        value: data.value,
        gas_limit: data.gas_limit,
        is_creation: data.is_creation,
        payload: data.payload,
        deposit_id,
        block_number,
        transaction_index: log.transaction_index.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        observed_at,
    })
}
