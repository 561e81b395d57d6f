use std::num::ParseIntError;

use alloy::primitives::U256;
use bigdecimal::{
    num_bigint::{BigInt, Sign},
    BigDecimal, ToPrimitive,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

const WEI_DECIMALS: i64 = 18;

/// Parse a JSON-RPC quantity ("0x1a") into a u64. The prefix is optional.
pub fn hex_to_u64(hex_str: &str) -> Result<u64, ParseIntError> {
    let digits = hex_str
        .strip_prefix("0x")
        .or_else(|| hex_str.strip_prefix("0X"))
        .unwrap_or(hex_str);
    u64::from_str_radix(digits, 16)
}

pub fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    hex_to_u64(&s).map_err(|e| serde::de::Error::custom(format!("invalid quantity {s}: {e}")))
}

/// Convert a wei amount into ETH for metrics and logs. Precision loss only
/// happens in the final f64 step.
pub fn wei_to_eth(value: U256) -> f64 {
    let wei = BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>());
    BigDecimal::new(wei, WEI_DECIMALS).to_f64().unwrap_or(f64::MAX)
}

/// Unix seconds to a UTC timestamp; out-of-range values clamp to the epoch.
pub fn unix_to_datetime(seconds: u64) -> DateTime<Utc> {
    i64::try_from(seconds)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
