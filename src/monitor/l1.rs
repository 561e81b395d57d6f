use std::{sync::Arc, time::Duration};

use alloy::{
    providers::{Provider, ProviderBuilder, WsConnect},
    rpc::types::{Filter, Log},
};
use anyhow::{anyhow, Result};
use tokio::{sync::broadcast::error::RecvError, time::sleep};

use crate::{
    state::AppState,
    utils::{
        events::{decode_deposit_event, DEPOSIT_EVENT_SIGNATURE},
        frozen::{check_frozen, PolicyErrorMode, PolicyVerdict},
    },
};

/// Oracle failures never block a deposit on the listener path.
pub const LISTENER_POLICY: PolicyErrorMode = PolicyErrorMode::FailOpen;

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Recorded,
    Blocked,
    Dropped,
}

/// Decode one delivered log, check the sender and record the deposit.
pub async fn handle_log(state: &AppState, log: &Log) -> LogOutcome {
    let topics = log.topics();
    state
        .logger
        .debug(format!("Event topic count: {}", topics.len()));
    for (i, topic) in topics.iter().enumerate() {
        state.logger.debug(format!("Topic {}: {}", i, topic));
    }
    state
        .logger
        .debug(format!("Data length: {}", log.data().data.len()));

    let deposit = match decode_deposit_event(state.l1.as_ref(), log).await {
        Ok(deposit) => deposit,
        Err(e) => {
            state
                .logger
                .severe(format!("Deposit event parsing error: {}", e));
            return LogOutcome::Dropped;
        }
    };

    let account = deposit.source_address.to_string();
    let verdict = check_frozen(state.frozen_registry.as_ref(), deposit.source_address).await;
    if let PolicyVerdict::Unavailable(e) = &verdict {
        state
            .logger
            .severe(format!("Address check error for {}: {}", account, e));
    }
    if verdict.is_blocked(LISTENER_POLICY) {
        state
            .logger
            .info(format!("Deposit from frozen account blocked: {}", account));
        state
            .metrics
            .blocked_deposits
            .with_label_values(&[&account])
            .inc();
        return LogOutcome::Blocked;
    }

    let value_eth = deposit.value_eth();
    state.metrics.total_deposits.inc();
    state
        .metrics
        .deposits_by_account
        .with_label_values(&[&account])
        .inc();
    state.metrics.deposit_value_total.inc_by(value_eth);
    state.metrics.deposit_value.observe(value_eth);
    state
        .metrics
        .deposit_gas_limit
        .observe(deposit.gas_limit as f64);

    let message = format!(
        "New deposit recorded: {} -> {} ({:.6} ETH, gas: {})",
        account, deposit.destination_address, value_eth, deposit.gas_limit
    );
    let pending = state.pending.insert(deposit).await;
    state.set_pending_gauge(pending);
    state.logger.info(message);

    LogOutcome::Recorded
}

/// Reconnect delays: doubles from `base` per consecutive failure, capped,
/// and runs out after `max_attempts` failures.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max_attempts: u32,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Backoff {
            base,
            max_attempts,
            failures: 0,
        }
    }

    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.failures >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(self.failures).unwrap_or(u32::MAX);
        let delay = self
            .base
            .checked_mul(factor)
            .unwrap_or(MAX_RECONNECT_DELAY)
            .min(MAX_RECONNECT_DELAY);
        self.failures += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

enum SessionEnd {
    Unreachable(anyhow::Error),
    Closed { delivered: usize },
}

fn deposit_filter(state: &AppState) -> Filter {
    Filter::new()
        .address(state.config.optimism_portal_address)
        .event_signature(DEPOSIT_EVENT_SIGNATURE)
}

async fn run_session(state: &AppState, filter: &Filter) -> SessionEnd {
    let ws = WsConnect::new(state.config.l1_rpc_url_ws.clone());
    let provider = match ProviderBuilder::new().on_ws(ws).await {
        Ok(provider) => provider,
        Err(e) => {
            return SessionEnd::Unreachable(
                anyhow::Error::new(e).context("could not connect to L1 websocket"),
            )
        }
    };
    let mut subscription = match provider.subscribe_logs(filter).await {
        Ok(subscription) => subscription,
        Err(e) => {
            return SessionEnd::Unreachable(
                anyhow::Error::new(e).context("L1 deposit event subscription failed"),
            )
        }
    };
    state.logger.info(format!(
        "Subscribed to deposit events of {}",
        state.config.optimism_portal_address
    ));

    let mut delivered = 0;
    loop {
        match subscription.recv().await {
            Ok(log) => {
                delivered += 1;
                handle_log(state, &log).await;
            }
            Err(RecvError::Lagged(skipped)) => {
                state.logger.warning(format!(
                    "L1 listener lagging behind, {} events skipped",
                    skipped
                ));
            }
            Err(RecvError::Closed) => return SessionEnd::Closed { delivered },
        }
    }
}

/// Listen for portal deposits until the retry budget runs out. Failing to
/// connect the very first time is an error.
pub async fn listen_l1_deposits(state: Arc<AppState>) -> Result<()> {
    state.logger.info("Starting L1 Deposit event listener...");
    let filter = deposit_filter(&state);
    let mut backoff = Backoff::new(
        state.config.l1_reconnect_delay,
        state.config.l1_max_reconnect_attempts,
    );
    let mut connected_once = false;

    loop {
        match run_session(&state, &filter).await {
            SessionEnd::Unreachable(e) if !connected_once => return Err(e),
            SessionEnd::Unreachable(e) => {
                state.logger.severe(format!("L1 reconnect failed: {:#}", e));
            }
            SessionEnd::Closed { delivered } => {
                connected_once = true;
                state.logger.severe(format!(
                    "L1 event listening error: subscription closed after {} events",
                    delivered
                ));
                if delivered > 0 {
                    backoff.reset();
                }
            }
        }

        let delay = backoff.next_delay().ok_or_else(|| {
            anyhow!(
                "giving up on the L1 subscription after {} consecutive failures",
                backoff.failures()
            )
        })?;
        state
            .logger
            .warning(format!("Reconnecting to L1 in {}s", delay.as_secs_f64()));
        sleep(delay).await;
    }
}
