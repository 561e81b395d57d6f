use std::sync::Arc;

use alloy::primitives::B256;
use anyhow::{anyhow, Result};
use tokio::time::sleep;

use crate::{state::AppState, utils::general::unix_to_datetime};

#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub deposit_id: B256,
    pub block_number: u64,
    pub latency_seconds: f64,
}

/// Match L2 transactions against pending deposits.
pub async fn scan_block(state: &AppState, number: u64) -> Result<Vec<Confirmation>> {
    let block = state
        .l2
        .block_with_transactions(number)
        .await?
        .ok_or_else(|| anyhow!("L2 block {} not found", number))?;
    if block.transactions.is_empty() {
        return Ok(Vec::new());
    }

    let pending = state.pending.snapshot().await;
    if pending.is_empty() {
        return Ok(Vec::new());
    }

    let block_time = unix_to_datetime(block.timestamp);
    let mut confirmations = Vec::new();
    for tx in &block.transactions {
        let hash = tx.hash();
        if !pending.contains_key(&hash) {
            continue;
        }
        // the snapshot may be stale, only the removal counts
        let Some(record) = state.pending.remove(&hash).await else {
            continue;
        };

        let latency_seconds =
            (block_time - record.observed_at).num_milliseconds() as f64 / 1000.0;
        state
            .metrics
            .l2_confirmation_latency
            .observe(latency_seconds);
        state.logger.info(format!(
            "Deposit {} confirmed on L2 block {} ({:.0}s after L1)",
            hash, block.number, latency_seconds
        ));
        confirmations.push(Confirmation {
            deposit_id: hash,
            block_number: block.number,
            latency_seconds,
        });
    }

    if !confirmations.is_empty() {
        state.set_pending_gauge(state.pending.len().await);
    }
    Ok(confirmations)
}

/// Polls L2 block by block. Starts from genesis.
#[derive(Debug, Default)]
pub struct L2Monitor {
    last_checked_block: u64,
}

impl L2Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_checked_block(&self) -> u64 {
        self.last_checked_block
    }

    /// Scan every block in `(last_checked_block, head]`. On a failed block
    /// progress stops right before it, so the next cycle retries it.
    pub async fn poll_once(&mut self, state: &AppState) -> Result<Vec<Confirmation>> {
        let head = state.l2.block_number().await?;
        let mut confirmations = Vec::new();
        while self.last_checked_block < head {
            let number = self.last_checked_block + 1;
            confirmations.extend(scan_block(state, number).await?);
            self.last_checked_block = number;
        }
        Ok(confirmations)
    }

    pub async fn run(mut self, state: Arc<AppState>) {
        state.logger.info("Starting L2 confirmation poller...");
        loop {
            if let Err(e) = self.poll_once(&state).await {
                state.logger.warning(format!(
                    "L2 poll failed after block {}: {:#}",
                    self.last_checked_block, e
                ));
            }
            sleep(state.config.l2_poll_interval).await;
        }
    }
}
