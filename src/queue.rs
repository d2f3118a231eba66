use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::sync::Arc;

use crate::{
    error::Result,
    store::Store,
    wallet::{DerivedAddress, Scheme},
};

/// A persisted candidate address awaiting (or done with) a balance check.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkItem {
    pub seq: i64,
    pub address: String,
    pub extended_private_key: Option<String>,
    pub extended_public_key: Option<String>,
    pub phrase: String,
    pub scheme: String,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {

    pub fn scheme(&self) -> Result<Scheme> {
        self.scheme.parse()
    }

    pub fn has_cached_keys(&self) -> bool {
        self.extended_private_key.is_some() && self.extended_public_key.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCandidate {
    pub address: String,
    pub extended_private_key: Option<String>,
    pub extended_public_key: Option<String>,
    pub phrase: String,
    pub scheme: Scheme,
}

impl NewCandidate {

    pub fn from_derived(derived: &DerivedAddress, phrase: &str) -> Self {
        NewCandidate {
            address: derived.address.to_string(),
            extended_private_key: Some(derived.xprv.clone()),
            extended_public_key: Some(derived.xpub.clone()),
            phrase: phrase.to_string(),
            scheme: derived.path.scheme,
        }
    }
}

/// At-most-once queue of candidate addresses over a shared [`Store`].
#[derive(Clone)]
pub struct WorkQueue {
    store: Arc<dyn Store>,
}

impl WorkQueue {

    pub fn new(store: Arc<dyn Store>) -> Self {
        WorkQueue { store }
    }

    pub async fn enqueue(&self, candidate: &NewCandidate) -> Result<WorkItem> {
        let item = self.store.insert_candidate(candidate).await?;
        tracing::debug!("Enqueued {} candidate #{}", candidate.scheme, item.seq);
        Ok(item)
    }

    /// Atomically takes the oldest unused item; `None` once drained.
    pub async fn claim_next(&self) -> Result<Option<WorkItem>> {
        let item = self.store.claim_next().await?;
        if let Some(item) = &item {
            tracing::debug!("Claimed candidate #{} ({})", item.seq, item.address);
        }
        Ok(item)
    }

    pub async fn mark_used(&self, address: &str) -> Result<u64> {
        self.store.mark_used(address).await
    }

    /// Appends a fresh copy of `item` to the tail of the queue. The claimed
    /// row stays used.
    pub async fn requeue(&self, item: &WorkItem) -> Result<WorkItem> {
        let candidate = NewCandidate {
            address: item.address.clone(),
            extended_private_key: item.extended_private_key.clone(),
            extended_public_key: item.extended_public_key.clone(),
            phrase: item.phrase.clone(),
            scheme: item.scheme()?,
        };
        let fresh = self.store.insert_candidate(&candidate).await?;
        tracing::debug!("Requeued candidate #{} as #{}", item.seq, fresh.seq);
        Ok(fresh)
    }

    pub async fn pending(&self) -> Result<u64> {
        self.store.count_unused().await
    }
}
