//! The claim-and-scan loop.
//!
//! Each iteration walks `Idle → Claiming → Deriving? → Querying →
//! Classifying → Persisting → Idle` and the loop ends in `Drained` once
//! the queue is empty. A claimed item always reaches `Persisting`; a
//! failure on one address never stops the run. Store errors while claiming
//! or recording a funded address are retried under [`StoreRetry`]; a
//! funded result the store never accepts goes to the fallback results file.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;

use crate::{
    error::{ErrorKind, Result, ScanError},
    mnemonic::Mnemonic,
    oracle::{Classification, OracleClient},
    queue::{WorkItem, WorkQueue},
    results::{ResultEntry, ResultsFile},
    sink::{BalanceRecord, ResultSink},
    wallet::{HDPath, Network, Wallet},
    wordlist::Wordlist,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Claiming,
    Deriving,
    Querying,
    Classifying,
    Persisting,
    Drained,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Bounded retry for store calls the loop cannot skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreRetry {
    /// Consecutive failed claims before a worker gives up, and attempts per
    /// funded-result insert.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for StoreRetry {
    fn default() -> Self {
        StoreRetry {
            attempts: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Keep an item used when its balance could not be determined. When
    /// false, a fresh copy is appended to the queue instead.
    pub used_on_failure: bool,
    /// Stop after this many claims across all workers.
    pub max_items: Option<u64>,
    /// Network used when keys have to be re-derived from the phrase.
    pub network: Network,
    pub store_retry: StoreRetry,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        ScanPolicy {
            used_on_failure: true,
            max_items: None,
            network: Network::Bitcoin,
            store_retry: StoreRetry::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub claimed: u64,
    pub zero: u64,
    pub funded: u64,
    pub unknown: u64,
    pub requeued: u64,
    pub derivation_failures: u64,
    pub persistence_failures: u64,
}

impl ScanReport {

    pub fn merge(&mut self, other: &ScanReport) {
        self.claimed += other.claimed;
        self.zero += other.zero;
        self.funded += other.funded;
        self.unknown += other.unknown;
        self.requeued += other.requeued;
        self.derivation_failures += other.derivation_failures;
        self.persistence_failures += other.persistence_failures;
    }
}

/// Cooperative cancellation, observed between iterations only.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    queue: WorkQueue,
    oracle: OracleClient,
    sink: ResultSink,
    wordlist: Arc<Wordlist>,
    policy: ScanPolicy,
    stop: StopHandle,
    claims: Arc<AtomicU64>,
    fallback: Option<Arc<Mutex<ResultsFile>>>,
}

impl Orchestrator {

    pub fn new(
        queue: WorkQueue,
        oracle: OracleClient,
        sink: ResultSink,
        wordlist: Arc<Wordlist>,
        policy: ScanPolicy,
    ) -> Self {
        Orchestrator {
            queue,
            oracle,
            sink,
            wordlist,
            policy,
            stop: StopHandle::new(),
            claims: Arc::new(AtomicU64::new(0)),
            fallback: None,
        }
    }

    /// Funded results the store rejects on every attempt are appended to
    /// `file` instead.
    pub fn with_fallback(mut self, file: ResultsFile) -> Self {
        self.fallback = Some(Arc::new(Mutex::new(file)));
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs a single loop until the queue drains, the stop handle fires or
    /// `max_items` is reached.
    pub async fn run(&self) -> Result<ScanReport> {
        self.run_loop(0).await
    }

    /// Runs `workers` loops concurrently over the shared queue and oracle.
    pub async fn run_workers(&self, workers: usize) -> Result<ScanReport> {
        let mut tasks = JoinSet::new();
        for worker in 0..workers.max(1) {
            let this = self.clone();
            tasks.spawn(async move { this.run_loop(worker).await });
        }

        let mut report = ScanReport::default();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(partial)) => report.merge(&partial),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(ScanError::Persistence(format!("worker task failed: {}", e)));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn reserve_claim(&self) -> bool {
        match self.policy.max_items {
            None => true,
            Some(max) => self
                .claims
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
                .is_ok(),
        }
    }

    fn release_claim(&self) {
        if self.policy.max_items.is_some() {
            self.claims.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn run_loop(&self, worker: usize) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        let mut state = ScanState::Idle;
        let mut claim_failures = 0u32;

        loop {
            if self.stop.is_stopped() {
                tracing::info!("Worker {} stopping on request", worker);
                break;
            }
            if !self.reserve_claim() {
                tracing::info!("Worker {} reached the item limit", worker);
                break;
            }

            transition(worker, &mut state, ScanState::Claiming);
            let item = match self.queue.claim_next().await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    transition(worker, &mut state, ScanState::Drained);
                    tracing::info!("Worker {}: queue drained", worker);
                    break;
                }
                Err(e) if e.kind() == ErrorKind::Config => return Err(e),
                Err(e) => {
                    self.release_claim();
                    report.persistence_failures += 1;
                    claim_failures += 1;
                    transition(worker, &mut state, ScanState::Idle);
                    if claim_failures >= self.policy.store_retry.attempts {
                        tracing::error!(
                            "❌ Worker {} giving up after {} failed claims: {}",
                            worker,
                            claim_failures,
                            e
                        );
                        break;
                    }
                    tracing::warn!(
                        "⚠️ Worker {} failed to claim ({}/{}): {}",
                        worker,
                        claim_failures,
                        self.policy.store_retry.attempts,
                        e
                    );
                    tokio::time::sleep(self.policy.store_retry.backoff).await;
                    continue;
                }
            };
            claim_failures = 0;
            report.claimed += 1;

            self.process(worker, &mut state, item, &mut report).await;
            transition(worker, &mut state, ScanState::Idle);
        }

        Ok(report)
    }

    async fn process(&self, worker: usize, state: &mut ScanState, mut item: WorkItem, report: &mut ScanReport) {
        if !item.has_cached_keys() {
            transition(worker, state, ScanState::Deriving);
            if let Err(e) = self.fill_keys(&mut item) {
                report.derivation_failures += 1;
                tracing::error!("❌ Derivation failed for candidate #{}: {}", item.seq, e);
                transition(worker, state, ScanState::Persisting);
                return;
            }
        }

        transition(worker, state, ScanState::Querying);
        let result = self.oracle.query(&item.address).await;

        transition(worker, state, ScanState::Classifying);
        let classification = Classification::from_result(&result);

        transition(worker, state, ScanState::Persisting);
        match classification {
            Classification::Zero => {
                report.zero += 1;
                tracing::info!("Address {} has zero balance", item.address);
                self.mark_used(&item, report).await;
            }
            Classification::Funded(balance) => {
                report.funded += 1;
                tracing::info!("💰 Address {} holds {}", item.address, balance);
                match BalanceRecord::new(&item, balance) {
                    Ok(record) => self.record(&record, report).await,
                    Err(e) => {
                        report.persistence_failures += 1;
                        tracing::error!("❌ Failed to record funded address {}: {}", item.address, e);
                    }
                }
                self.mark_used(&item, report).await;
            }
            Classification::Unknown(reason) => {
                report.unknown += 1;
                tracing::warn!("⚠️ Balance of {} unknown: {}", item.address, reason);
                if !self.policy.used_on_failure {
                    match self.queue.requeue(&item).await {
                        Ok(_) => report.requeued += 1,
                        Err(e) => {
                            report.persistence_failures += 1;
                            tracing::error!("❌ Failed to requeue {}: {}", item.address, e);
                        }
                    }
                }
            }
        }
    }

    /// Inserts a funded result, retrying with backoff.
    async fn record(&self, record: &BalanceRecord, report: &mut ScanReport) {
        let attempts = self.policy.store_retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.sink.record(record).await {
                Ok(()) => return,
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        "⚠️ Recording {} failed (attempt {}/{}): {}",
                        record.address,
                        attempt,
                        attempts,
                        e
                    );
                    tokio::time::sleep(self.policy.store_retry.backoff).await;
                }
                Err(e) => {
                    report.persistence_failures += 1;
                    tracing::error!(
                        "❌ Failed to record funded address {} ({} sats): {}",
                        record.address,
                        record.balance,
                        e
                    );
                    self.save_fallback(record);
                }
            }
        }
    }

    fn save_fallback(&self, record: &BalanceRecord) {
        let Some(fallback) = &self.fallback else {
            return;
        };
        let saved = match fallback.lock() {
            Ok(mut file) => file
                .push(ResultEntry {
                    phrase: record.phrase.clone(),
                    address: record.address.clone(),
                })
                .map(|()| file.path().display().to_string()),
            Err(_) => Err(ScanError::Persistence("fallback file lock poisoned".to_string())),
        };
        match saved {
            Ok(path) => tracing::warn!("⚠️ Funded address {} saved to {}", record.address, path),
            Err(e) => tracing::error!("❌ Fallback save for {} failed: {}", record.address, e),
        }
    }

    async fn mark_used(&self, item: &WorkItem, report: &mut ScanReport) {
        if let Err(e) = self.queue.mark_used(&item.address).await {
            report.persistence_failures += 1;
            tracing::error!("❌ Failed to mark {} as used: {}", item.address, e);
        }
    }

    /// Re-derives the account keys of an item stored without them and
    /// checks that the phrase still yields the stored address.
    fn fill_keys(&self, item: &mut WorkItem) -> Result<()> {
        let mnemonic = Mnemonic::from_phrase(&item.phrase, &self.wordlist)?;
        let wallet = Wallet::from_mnemonic(&mnemonic, "", self.policy.network)?;
        let derived = wallet.derive_address(&HDPath::new(item.scheme()?, self.policy.network))?;

        if derived.address.as_str() != item.address {
            return Err(ScanError::DerivationError(format!(
                "phrase derives {} instead of {}",
                derived.address, item.address
            )));
        }

        item.extended_private_key = Some(derived.xprv);
        item.extended_public_key = Some(derived.xpub);
        Ok(())
    }
}

fn transition(worker: usize, state: &mut ScanState, next: ScanState) {
    tracing::trace!("Worker {}: {} -> {}", worker, state, next);
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        oracle::{OracleConfig, RetryPolicy},
        queue::NewCandidate,
        sink::BalanceRecord,
        store::{MemoryStore, Store},
        wallet::Scheme,
        wordlist::fixtures::english,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn body(sats: u64) -> serde_json::Value {
        serde_json::json!({ "chain_stats": { "funded_txo_sum": sats } })
    }

    async fn respond(server: &MockServer, address: &str, template: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(format!("/address/{}", address)))
            .respond_with(template)
            .mount(server)
            .await;
    }

    fn oracle(server: &MockServer) -> OracleClient {
        OracleClient::new(OracleConfig {
            base_url: server.uri(),
            proxies: Vec::new(),
            timeout: Duration::from_secs(5),
            min_request_interval: Duration::ZERO,
            retry: RetryPolicy {
                max_rate_limit_retries: 1,
                rate_limit_backoff: Duration::from_millis(10),
                retry_server_errors: true,
            },
        })
        .unwrap()
    }

    fn orchestrator(store: Arc<dyn Store>, server: &MockServer, policy: ScanPolicy) -> Orchestrator {
        Orchestrator::new(
            WorkQueue::new(store.clone()),
            oracle(server),
            ResultSink::new(store),
            Arc::new(english().clone()),
            policy,
        )
    }

    fn candidate(address: &str) -> NewCandidate {
        NewCandidate {
            address: address.to_string(),
            extended_private_key: Some("xprv".to_string()),
            extended_public_key: Some("xpub".to_string()),
            phrase: "phrase".to_string(),
            scheme: Scheme::Bip44,
        }
    }

    #[tokio::test]
    async fn test_funded_and_zero() {
        let server = MockServer::start().await;
        respond(&server, "funded", ResponseTemplate::new(200).set_body_json(body(150_000_000))).await;
        respond(&server, "empty", ResponseTemplate::new(200).set_body_json(body(0))).await;

        let store = Arc::new(MemoryStore::new());
        store.insert_candidate(&candidate("funded")).await.unwrap();
        store.insert_candidate(&candidate("empty")).await.unwrap();

        let report = orchestrator(store.clone(), &server, ScanPolicy::default()).run().await.unwrap();
        assert_eq!(report.claimed, 2);
        assert_eq!(report.funded, 1);
        assert_eq!(report.zero, 1);

        let found = store.found().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, "funded");
        assert_eq!(found[0].balance, 150_000_000);
        assert!(store.candidates().unwrap().iter().all(|c| c.used));
    }

    #[tokio::test]
    async fn test_unknown_stays_used() {
        let server = MockServer::start().await;
        respond(&server, "flaky", ResponseTemplate::new(503)).await;

        let store = Arc::new(MemoryStore::new());
        store.insert_candidate(&candidate("flaky")).await.unwrap();

        let report = orchestrator(store.clone(), &server, ScanPolicy::default()).run().await.unwrap();
        assert_eq!(report.unknown, 1);
        assert_eq!(report.requeued, 0);
        assert!(store.found().await.unwrap().is_empty());
        assert_eq!(store.count_unused().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_requeued_when_configured() {
        let server = MockServer::start().await;
        respond(&server, "flaky", ResponseTemplate::new(503)).await;

        let store = Arc::new(MemoryStore::new());
        store.insert_candidate(&candidate("flaky")).await.unwrap();

        let policy = ScanPolicy {
            used_on_failure: false,
            max_items: Some(3),
            ..ScanPolicy::default()
        };
        let report = orchestrator(store.clone(), &server, policy).run().await.unwrap();
        assert_eq!(report.claimed, 3);
        assert_eq!(report.requeued, 3);

        let rows = store.candidates().unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.iter().filter(|r| !r.used).count(), 1);
    }

    #[tokio::test]
    async fn test_missing_keys_are_rederived() {
        let server = MockServer::start().await;
        let address = "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA";
        respond(&server, address, ResponseTemplate::new(200).set_body_json(body(5_000))).await;

        let store = Arc::new(MemoryStore::new());
        store
            .insert_candidate(&NewCandidate {
                address: address.to_string(),
                extended_private_key: None,
                extended_public_key: None,
                phrase: PHRASE.to_string(),
                scheme: Scheme::Bip44,
            })
            .await
            .unwrap();

        let report = orchestrator(store.clone(), &server, ScanPolicy::default()).run().await.unwrap();
        assert_eq!(report.funded, 1);

        let found = store.found().await.unwrap();
        assert!(found[0].extended_private_key.as_deref().unwrap().starts_with("xprv"));
        assert!(found[0].extended_public_key.as_deref().unwrap().starts_with("xpub"));
    }

    #[tokio::test]
    async fn test_derivation_failure_continues() {
        let server = MockServer::start().await;
        respond(&server, "next", ResponseTemplate::new(200).set_body_json(body(0))).await;

        let store = Arc::new(MemoryStore::new());
        store
            .insert_candidate(&NewCandidate {
                address: "broken".to_string(),
                extended_private_key: None,
                extended_public_key: None,
                phrase: "not a valid phrase".to_string(),
                scheme: Scheme::Bip84,
            })
            .await
            .unwrap();
        store.insert_candidate(&candidate("next")).await.unwrap();

        let report = orchestrator(store.clone(), &server, ScanPolicy::default()).run().await.unwrap();
        assert_eq!(report.claimed, 2);
        assert_eq!(report.derivation_failures, 1);
        assert_eq!(report.zero, 1);
        assert!(store.candidates().unwrap().iter().all(|c| c.used));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        store.insert_candidate(&candidate("a")).await.unwrap();

        let orchestrator = orchestrator(store.clone(), &server, ScanPolicy::default());
        orchestrator.stop_handle().stop();
        let report = orchestrator.run().await.unwrap();

        assert_eq!(report, ScanReport::default());
        assert_eq!(store.count_unused().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_workers_share_the_queue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(0)))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        for i in 0..20 {
            store.insert_candidate(&candidate(&format!("addr{}", i))).await.unwrap();
        }

        let report = orchestrator(store.clone(), &server, ScanPolicy::default())
            .run_workers(4)
            .await
            .unwrap();
        assert_eq!(report.claimed, 20);
        assert_eq!(report.zero, 20);
        assert_eq!(server.received_requests().await.unwrap().len(), 20);
    }

    /// Memory store that fails the claim and found-insert calls whose
    /// zero-based index falls in the given ranges.
    #[derive(Default)]
    struct Flaky {
        inner: MemoryStore,
        failing_claims: std::ops::Range<usize>,
        failing_inserts: std::ops::Range<usize>,
        claims: AtomicUsize,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl Store for Flaky {
        async fn insert_candidate(&self, candidate: &NewCandidate) -> crate::error::Result<WorkItem> {
            self.inner.insert_candidate(candidate).await
        }
        async fn claim_next(&self) -> crate::error::Result<Option<WorkItem>> {
            let call = self.claims.fetch_add(1, Ordering::SeqCst);
            if self.failing_claims.contains(&call) {
                return Err(ScanError::Persistence("connection reset".to_string()));
            }
            self.inner.claim_next().await
        }
        async fn mark_used(&self, address: &str) -> crate::error::Result<u64> {
            self.inner.mark_used(address).await
        }
        async fn count_unused(&self) -> crate::error::Result<u64> {
            self.inner.count_unused().await
        }
        async fn insert_found(&self, record: &BalanceRecord) -> crate::error::Result<()> {
            let call = self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.failing_inserts.contains(&call) {
                return Err(ScanError::Persistence("found table unavailable".to_string()));
            }
            self.inner.insert_found(record).await
        }
        async fn found(&self) -> crate::error::Result<Vec<BalanceRecord>> {
            self.inner.found().await
        }
    }

    fn fast_retry() -> ScanPolicy {
        ScanPolicy {
            store_retry: StoreRetry {
                attempts: 3,
                backoff: Duration::from_millis(5),
            },
            ..ScanPolicy::default()
        }
    }

    async fn balances(server: &MockServer, sats: u64) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(sats)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_persistence_failure_continues() {
        let server = MockServer::start().await;
        balances(&server, 1).await;

        let store = Arc::new(Flaky {
            failing_inserts: 0..usize::MAX,
            ..Flaky::default()
        });
        store.insert_candidate(&candidate("a")).await.unwrap();
        store.insert_candidate(&candidate("b")).await.unwrap();

        let report = orchestrator(store.clone(), &server, fast_retry()).run().await.unwrap();
        assert_eq!(report.claimed, 2);
        assert_eq!(report.funded, 2);
        assert_eq!(report.persistence_failures, 2);
        assert_eq!(store.inserts.load(Ordering::SeqCst), 6);
        assert_eq!(store.count_unused().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unrecorded_funded_address_goes_to_fallback() {
        let server = MockServer::start().await;
        balances(&server, 1).await;

        let store = Arc::new(Flaky {
            failing_inserts: 0..usize::MAX,
            ..Flaky::default()
        });
        store.insert_candidate(&candidate("a")).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unrecorded.json");
        let report = orchestrator(store.clone(), &server, fast_retry())
            .with_fallback(ResultsFile::open(&path).unwrap())
            .run()
            .await
            .unwrap();
        assert_eq!(report.persistence_failures, 1);

        let saved = ResultsFile::open(&path).unwrap();
        assert_eq!(
            saved.entries(),
            &[ResultEntry {
                phrase: "phrase".to_string(),
                address: "a".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_funded_insert_recovers_on_retry() {
        let server = MockServer::start().await;
        balances(&server, 7_000).await;

        let store = Arc::new(Flaky {
            failing_inserts: 0..2,
            ..Flaky::default()
        });
        store.insert_candidate(&candidate("a")).await.unwrap();

        let report = orchestrator(store.clone(), &server, fast_retry()).run().await.unwrap();
        assert_eq!(report.funded, 1);
        assert_eq!(report.persistence_failures, 0);

        let found = store.found().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, "a");
        assert_eq!(found[0].balance, 7_000);
    }

    #[tokio::test]
    async fn test_transient_claim_failure_continues() {
        let server = MockServer::start().await;
        balances(&server, 0).await;

        let store = Arc::new(Flaky {
            failing_claims: 1..2,
            ..Flaky::default()
        });
        for address in ["a", "b", "c"] {
            store.insert_candidate(&candidate(address)).await.unwrap();
        }

        let report = orchestrator(store.clone(), &server, fast_retry()).run().await.unwrap();
        assert_eq!(report.claimed, 3);
        assert_eq!(report.zero, 3);
        assert_eq!(report.persistence_failures, 1);
        assert_eq!(store.count_unused().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_failure_does_not_consume_item_limit() {
        let server = MockServer::start().await;
        balances(&server, 0).await;

        let store = Arc::new(Flaky {
            failing_claims: 0..1,
            ..Flaky::default()
        });
        store.insert_candidate(&candidate("a")).await.unwrap();
        store.insert_candidate(&candidate("b")).await.unwrap();

        let policy = ScanPolicy {
            max_items: Some(2),
            ..fast_retry()
        };
        let report = orchestrator(store.clone(), &server, policy).run().await.unwrap();
        assert_eq!(report.claimed, 2);
        assert_eq!(report.persistence_failures, 1);
        assert_eq!(store.count_unused().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_worker_gives_up_when_store_stays_down() {
        let server = MockServer::start().await;
        let store = Arc::new(Flaky {
            failing_claims: 0..usize::MAX,
            ..Flaky::default()
        });
        store.insert_candidate(&candidate("a")).await.unwrap();

        let report = orchestrator(store.clone(), &server, fast_retry()).run().await.unwrap();
        assert_eq!(report.claimed, 0);
        assert_eq!(report.persistence_failures, 3);
        assert_eq!(store.claims.load(Ordering::SeqCst), 3);
        assert_eq!(store.count_unused().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stop_during_query_finishes_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body(0))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        for address in ["a", "b", "c"] {
            store.insert_candidate(&candidate(address)).await.unwrap();
        }

        let orchestrator = orchestrator(store.clone(), &server, ScanPolicy::default());
        let stop = orchestrator.stop_handle();
        let running = tokio::spawn(async move { orchestrator.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.stop();
        let report = running.await.unwrap().unwrap();

        assert_eq!(report.claimed, 1);
        assert_eq!(report.zero, 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        let rows = store.candidates().unwrap();
        assert!(rows.iter().find(|r| r.address == "a").unwrap().used);
        assert_eq!(store.count_unused().await.unwrap(), 2);
    }
}
