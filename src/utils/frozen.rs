use std::sync::Arc;

use alloy::{primitives::Address, sol, sol_types::SolCall};
use async_trait::async_trait;
use thiserror::Error;

use crate::{
    logger::Logger,
    utils::rpc::{JsonRpcClient, RpcError},
};

sol! {
    function isFrozen(address account) external view returns (bool frozen);
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("could not connect to ethereum client: {0}")]
    Connection(#[source] RpcError),
    #[error("no contract found at {0}")]
    NoContractFound(Address),
    #[error("could not unpack output: {0}")]
    Decoding(String),
    #[error("contract call failed: {0}")]
    Call(#[source] RpcError),
}

/// Answers "is this account frozen?".
#[async_trait]
pub trait FrozenCheck: Send + Sync {
    async fn is_frozen(&self, account: Address) -> Result<bool, OracleError>;
}

/// How a caller treats an oracle failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyErrorMode {
    /// Treat the account as not frozen.
    FailOpen,
    /// Treat the account as frozen.
    FailClosed,
}

#[derive(Debug)]
pub enum PolicyVerdict {
    Clear,
    Frozen,
    Unavailable(OracleError),
}

impl PolicyVerdict {
    pub fn is_blocked(&self, mode: PolicyErrorMode) -> bool {
        match self {
            PolicyVerdict::Clear => false,
            PolicyVerdict::Frozen => true,
            PolicyVerdict::Unavailable(_) => mode == PolicyErrorMode::FailClosed,
        }
    }
}

pub async fn check_frozen(oracle: &dyn FrozenCheck, account: Address) -> PolicyVerdict {
    match oracle.is_frozen(account).await {
        Ok(true) => PolicyVerdict::Frozen,
        Ok(false) => PolicyVerdict::Clear,
        Err(e) => PolicyVerdict::Unavailable(e),
    }
}

/// `isFrozen(address)` on the frozen-accounts registry contract.
pub struct FrozenRegistry {
    logger: Logger,
    registry: Address,
    client: Arc<JsonRpcClient>,
}

impl FrozenRegistry {
    pub fn new(logger: Logger, registry: Address, client: Arc<JsonRpcClient>) -> Self {
        FrozenRegistry {
            logger,
            registry,
            client,
        }
    }
}

#[async_trait]
impl FrozenCheck for FrozenRegistry {
    async fn is_frozen(&self, account: Address) -> Result<bool, OracleError> {
        let chain_id = self
            .client
            .chain_id()
            .await
            .map_err(OracleError::Connection)?;
        self.logger.debug(format!(
            "Checking {} against registry {} on chain {}",
            account, self.registry, chain_id
        ));

        let code = self
            .client
            .get_code(self.registry)
            .await
            .map_err(OracleError::Connection)?;
        if code.is_empty() {
            return Err(OracleError::NoContractFound(self.registry));
        }

        let input = isFrozenCall { account }.abi_encode();
        let output = self
            .client
            .call(self.registry, input.into())
            .await
            .map_err(OracleError::Call)?;
        if output.is_empty() {
            return Err(OracleError::Decoding(
                "contract returned empty output".to_string(),
            ));
        }

        isFrozenCall::abi_decode_returns(&output, true)
            .map(|ret| ret.frozen)
            .map_err(|e| OracleError::Decoding(e.to_string()))
    }
}
