use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::interval;

use crate::state::AppState;

const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Drop pending deposits older than `ttl`, returns how many went.
pub async fn sweep_expired(state: &AppState, ttl: Duration, now: DateTime<Utc>) -> usize {
    let expired = state.pending.sweep_older_than(ttl, now).await;
    if expired.is_empty() {
        return 0;
    }

    for record in &expired {
        state.logger.warning(format!(
            "Pending deposit {} from {} expired without L2 confirmation (observed at {})",
            record.deposit_id, record.source_address, record.observed_at
        ));
    }
    state
        .metrics
        .pending_deposits_expired
        .inc_by(expired.len() as u64);
    state.set_pending_gauge(state.pending.len().await);
    expired.len()
}

pub async fn run_sweeper(state: Arc<AppState>, ttl: Duration) {
    state.logger.info(format!(
        "Pending deposits expire after {}s",
        ttl.as_secs()
    ));
    let mut ticker = interval((ttl / 10).clamp(MIN_SWEEP_PERIOD, MAX_SWEEP_PERIOD));
    loop {
        ticker.tick().await;
        sweep_expired(&state, ttl, Utc::now()).await;
    }
}
