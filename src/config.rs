use std::{env, str::FromStr, time::Duration};

use alloy::primitives::Address;
use thiserror::Error;

use crate::logger::Logger;

pub const DEFAULT_PROXY_PORT: u16 = 8545;
pub const DEFAULT_METRICS_PORT: u16 = 9100;
const DEFAULT_L2_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_L1_RECONNECT_DELAY_MS: u64 = 5_000;
const DEFAULT_L1_MAX_RECONNECT_ATTEMPTS: u32 = 10;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub l1_rpc_url: String,
    pub l1_rpc_url_ws: String,
    pub l2_rpc_url: String,
    pub proxy_port: u16,
    pub metrics_port: u16,
    pub frozen_contract_address: Address,
    pub optimism_portal_address: Address,
    pub l2_poll_interval: Duration,
    pub l1_reconnect_delay: Duration,
    pub l1_max_reconnect_attempts: u32,
    /// Age after which an unconfirmed deposit is dropped. `None` keeps
    /// pending deposits until they are confirmed.
    pub pending_deposit_ttl: Option<Duration>,
}

impl Config {
    pub fn from_env(logger: &Logger) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok(), logger)
    }

    pub fn from_lookup<F>(lookup: F, logger: &Logger) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let l1_rpc_url = required("L1_RPC_URL")?;
        let l1_rpc_url_ws = required("L1_RPC_URL_WS")?;
        let l2_rpc_url = required("L2_RPC_URL")?;
        let frozen_contract_address =
            parse_address("FROZEN_CONTRACT_ADDRESS", &required("FROZEN_CONTRACT_ADDRESS")?)?;
        let optimism_portal_address =
            parse_address("OPTIMISM_PORTAL_ADDRESS", &required("OPTIMISM_PORTAL_ADDRESS")?)?;

        let proxy_port = match get("PROXY_PORT") {
            Some(value) => parse_number("PROXY_PORT", &value)?,
            None => {
                logger.warning(format!(
                    "PROXY_PORT not set, using default: {}",
                    DEFAULT_PROXY_PORT
                ));
                DEFAULT_PROXY_PORT
            }
        };
        let metrics_port = match get("METRICS_PORT") {
            Some(value) => parse_number("METRICS_PORT", &value)?,
            None => {
                logger.warning(format!(
                    "METRICS_PORT not set, using default: {}",
                    DEFAULT_METRICS_PORT
                ));
                DEFAULT_METRICS_PORT
            }
        };

        let l2_poll_interval_ms = get("L2_POLL_INTERVAL_MS")
            .map(|value| parse_number("L2_POLL_INTERVAL_MS", &value))
            .transpose()?
            .unwrap_or(DEFAULT_L2_POLL_INTERVAL_MS);
        let l1_reconnect_delay_ms = get("L1_RECONNECT_DELAY_MS")
            .map(|value| parse_number("L1_RECONNECT_DELAY_MS", &value))
            .transpose()?
            .unwrap_or(DEFAULT_L1_RECONNECT_DELAY_MS);
        let l1_max_reconnect_attempts = get("L1_MAX_RECONNECT_ATTEMPTS")
            .map(|value| parse_number("L1_MAX_RECONNECT_ATTEMPTS", &value))
            .transpose()?
            .unwrap_or(DEFAULT_L1_MAX_RECONNECT_ATTEMPTS);
        let pending_deposit_ttl = get("PENDING_DEPOSIT_TTL_SECS")
            .map(|value| parse_number::<u64>("PENDING_DEPOSIT_TTL_SECS", &value))
            .transpose()?
            .map(Duration::from_secs);

        Ok(Config {
            l1_rpc_url,
            l1_rpc_url_ws,
            l2_rpc_url,
            proxy_port,
            metrics_port,
            frozen_contract_address,
            optimism_portal_address,
            l2_poll_interval: Duration::from_millis(l2_poll_interval_ms),
            l1_reconnect_delay: Duration::from_millis(l1_reconnect_delay_ms),
            l1_max_reconnect_attempts,
            pending_deposit_ttl,
        })
    }
}

fn parse_address(name: &'static str, value: &str) -> Result<Address, ConfigError> {
    Address::from_str(value.trim()).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_number<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}
