//! Persistence backends for the work queue and the funded-address sink.

use async_trait::async_trait;

use crate::{
    error::Result,
    queue::{NewCandidate, WorkItem},
    sink::BalanceRecord,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Backing store shared by [`crate::queue::WorkQueue`] and
/// [`crate::sink::ResultSink`].
///
/// `claim_next` must select the oldest unused candidate and flip it to
/// used in one atomic step, so that concurrent callers never receive the
/// same row. No method ever sets `used` back to false.
#[async_trait]
pub trait Store: Send + Sync {

    async fn insert_candidate(&self, candidate: &NewCandidate) -> Result<WorkItem>;

    async fn claim_next(&self) -> Result<Option<WorkItem>>;

    /// Returns the number of rows that changed; zero when already used.
    async fn mark_used(&self, address: &str) -> Result<u64>;

    async fn count_unused(&self) -> Result<u64>;

    async fn insert_found(&self, record: &BalanceRecord) -> Result<()>;

    async fn found(&self) -> Result<Vec<BalanceRecord>>;
}
