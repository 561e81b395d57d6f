use std::{collections::HashMap, time::Duration};

use alloy::primitives::B256;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::deposits::DepositRecord;

/// Deposits seen on L1 and not yet matched on L2, keyed by deposit id.
/// Callers only get owned copies out; the table never leaves the lock.
#[derive(Debug, Default)]
pub struct PendingDeposits {
    deposits: RwLock<HashMap<B256, DepositRecord>>,
}

impl PendingDeposits {
    impl_with_lock!(with_deposits, deposits, HashMap<B256, DepositRecord>);

    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert by `deposit_id`, returns the store size afterwards.
    pub async fn insert(&self, record: DepositRecord) -> usize {
        self.with_deposits(|deposits| {
            deposits.insert(record.deposit_id, record);
            deposits.len()
        })
        .await
    }

    /// Returns the removed record, `None` if it was not pending.
    pub async fn remove(&self, deposit_id: &B256) -> Option<DepositRecord> {
        self.with_deposits(|deposits| deposits.remove(deposit_id))
            .await
    }

    pub async fn snapshot(&self) -> HashMap<B256, DepositRecord> {
        self.with_deposits_read(|deposits| deposits.clone()).await
    }

    pub async fn len(&self) -> usize {
        self.with_deposits_read(|deposits| deposits.len()).await
    }

    /// Drop every record observed more than `max_age` before `now` and
    /// return them.
    pub async fn sweep_older_than(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Vec<DepositRecord> {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return Vec::new();
        };
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            return Vec::new();
        };

        self.with_deposits(|deposits| {
            let expired: Vec<B256> = deposits
                .iter()
                .filter(|(_, record)| record.observed_at < cutoff)
                .map(|(id, _)| *id)
                .collect();
            expired
                .iter()
                .filter_map(|id| deposits.remove(id))
                .collect()
        })
        .await
    }
}
