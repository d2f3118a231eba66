use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

use super::Store;
use crate::{
    error::{Result, ScanError},
    queue::{NewCandidate, WorkItem},
    sink::BalanceRecord,
};

#[derive(Default)]
struct State {
    next_seq: i64,
    candidates: Vec<WorkItem>,
    found: Vec<BalanceRecord>,
}

/// In-process store. Every operation runs inside one critical section, so
/// claims are atomic across tasks and threads.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {

    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ScanError::Persistence("memory store lock poisoned".to_string()))
    }

    /// Snapshot of every candidate, used or not, in insertion order.
    pub fn candidates(&self) -> Result<Vec<WorkItem>> {
        Ok(self.lock()?.candidates.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<WorkItem> {
        let mut state = self.lock()?;
        state.next_seq += 1;

        let item = WorkItem {
            seq: state.next_seq,
            address: candidate.address.clone(),
            extended_private_key: candidate.extended_private_key.clone(),
            extended_public_key: candidate.extended_public_key.clone(),
            phrase: candidate.phrase.clone(),
            scheme: candidate.scheme.to_string(),
            used: false,
            created_at: Utc::now(),
        };
        state.candidates.push(item.clone());
        Ok(item)
    }

    async fn claim_next(&self) -> Result<Option<WorkItem>> {
        let mut state = self.lock()?;
        let next = state
            .candidates
            .iter_mut()
            .filter(|item| !item.used)
            .min_by_key(|item| (item.created_at, item.seq));

        Ok(next.map(|item| {
            item.used = true;
            item.clone()
        }))
    }

    async fn mark_used(&self, address: &str) -> Result<u64> {
        let mut state = self.lock()?;
        let mut changed = 0;
        for item in state.candidates.iter_mut().filter(|i| i.address == address && !i.used) {
            item.used = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn count_unused(&self) -> Result<u64> {
        Ok(self.lock()?.candidates.iter().filter(|i| !i.used).count() as u64)
    }

    async fn insert_found(&self, record: &BalanceRecord) -> Result<()> {
        self.lock()?.found.push(record.clone());
        Ok(())
    }

    async fn found(&self) -> Result<Vec<BalanceRecord>> {
        Ok(self.lock()?.found.clone())
    }
}
