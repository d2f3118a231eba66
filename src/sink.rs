use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::Arc;

use crate::{
    error::{Result, ScanError},
    oracle::Balance,
    queue::WorkItem,
    store::Store,
};

/// A funded address as persisted in the `found` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BalanceRecord {
    pub address: String,
    pub extended_private_key: Option<String>,
    pub extended_public_key: Option<String>,
    pub phrase: String,
    /// Satoshis.
    pub balance: i64,
    #[sqlx(rename = "created_at")]
    pub observed_at: DateTime<Utc>,
}

impl BalanceRecord {

    pub fn new(item: &WorkItem, balance: Balance) -> Result<Self> {
        let sats = i64::try_from(balance.sats())
            .map_err(|_| ScanError::Persistence(format!("balance {} does not fit BIGINT", balance.sats())))?;

        Ok(BalanceRecord {
            address: item.address.clone(),
            extended_private_key: item.extended_private_key.clone(),
            extended_public_key: item.extended_public_key.clone(),
            phrase: item.phrase.clone(),
            balance: sats,
            observed_at: Utc::now(),
        })
    }

    pub fn balance(&self) -> Balance {
        Balance::from_sats(self.balance.max(0) as u64)
    }
}

/// Insert-only destination for funded addresses.
#[derive(Clone)]
pub struct ResultSink {
    store: Arc<dyn Store>,
}

impl ResultSink {

    pub fn new(store: Arc<dyn Store>) -> Self {
        ResultSink { store }
    }

    pub async fn record(&self, record: &BalanceRecord) -> Result<()> {
        self.store.insert_found(record).await?;
        tracing::info!("💰 Recorded funded address {} ({})", record.address, record.balance());
        Ok(())
    }

    pub async fn records(&self) -> Result<Vec<BalanceRecord>> {
        self.store.found().await
    }
}
