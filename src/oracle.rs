//! Balance oracle client.
//!
//! Queries an Esplora-style HTTP API (`GET <base>/address/<address>`) and
//! reads `chain_stats.funded_txo_sum` as the balance figure. Requests go
//! out through a pool of routes (proxies or a direct connection). Rate
//! limiting is retried with a fixed backoff on the same route; transport
//! failures rotate to the next route until every route has failed once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Result, ScanError};

pub const DEFAULT_BASE_URL: &str = "https://mempool.space/api";

/// Route label that means "no proxy".
pub const DIRECT_ROUTE: &str = "direct";

const SATS_PER_BTC: f64 = 100_000_000.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {

    #[error("rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("all routes failed after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Balance in satoshis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Balance {
    sats: u64,
}

impl Balance {

    pub fn from_sats(sats: u64) -> Self {
        Balance { sats }
    }

    pub fn sats(self) -> u64 {
        self.sats
    }

    pub fn to_btc(self) -> f64 {
        self.sats as f64 / SATS_PER_BTC
    }

    pub fn is_zero(self) -> bool {
        self.sats == 0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::utils::format_btc(self.sats))
    }
}

/// Outcome of one oracle query. A failed query is `Unknown`, never `Zero`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Zero,
    Funded(Balance),
    Unknown(String),
}

impl Classification {

    pub fn from_result(result: &std::result::Result<Balance, OracleError>) -> Self {
        match result {
            Ok(balance) if balance.is_zero() => Classification::Zero,
            Ok(balance) => Classification::Funded(*balance),
            Err(e) => Classification::Unknown(e.to_string()),
        }
    }
}

/// A retryable failure of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    RateLimited,
    Transport,
    ServerError(u16),
}

impl Failure {

    fn of(error: &OracleError) -> Option<Self> {
        match error {
            OracleError::RateLimited { .. } => Some(Failure::RateLimited),
            OracleError::Transport(_) => Some(Failure::Transport),
            OracleError::Status(status) if (500..600).contains(status) => Some(Failure::ServerError(*status)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then retry on the same route.
    Backoff(Duration),
    /// Retry on the next route.
    Rotate,
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_rate_limit_retries: u32,
    pub rate_limit_backoff: Duration,
    pub retry_server_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_rate_limit_retries: 5,
            rate_limit_backoff: Duration::from_secs(5),
            retry_server_errors: true,
        }
    }
}

impl RetryPolicy {

    /// `attempt` is the 1-based count of consecutive failures of this kind.
    pub fn decide(&self, failure: Failure, attempt: u32) -> RetryDecision {
        match failure {
            Failure::RateLimited if attempt <= self.max_rate_limit_retries => {
                RetryDecision::Backoff(self.rate_limit_backoff)
            }
            Failure::RateLimited => RetryDecision::GiveUp,
            Failure::Transport => RetryDecision::Rotate,
            Failure::ServerError(_) if self.retry_server_errors => RetryDecision::Rotate,
            Failure::ServerError(_) => RetryDecision::GiveUp,
        }
    }
}

/// Minimum spacing between any two outbound requests. Clones share state.
#[derive(Debug, Clone)]
pub struct RateGate {
    interval: Duration,
    last: Arc<Mutex<Option<Instant>>>,
}

impl RateGate {

    pub fn new(interval: Duration) -> Self {
        RateGate {
            interval,
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub base_url: String,
    /// Proxy URLs, or [`DIRECT_ROUTE`]. Empty means a single direct route.
    pub proxies: Vec<String>,
    pub timeout: Duration,
    pub min_request_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            proxies: Vec::new(),
            timeout: Duration::from_secs(10),
            min_request_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
struct Route {
    label: String,
    client: reqwest::Client,
}

impl Route {

    fn build(label: &str, timeout: Duration) -> Result<Self> {
        let builder = reqwest::Client::builder().timeout(timeout);
        let builder = if label.eq_ignore_ascii_case(DIRECT_ROUTE) {
            builder.no_proxy()
        } else {
            let proxy = reqwest::Proxy::all(label)
                .map_err(|e| ScanError::Config(format!("invalid proxy '{}': {}", label, e)))?;
            builder.proxy(proxy)
        };

        let client = builder
            .build()
            .map_err(|e| ScanError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Route {
            label: label.to_string(),
            client,
        })
    }
}

#[derive(Deserialize)]
struct AddressInfo {
    chain_stats: ChainStats,
}

#[derive(Deserialize)]
struct ChainStats {
    funded_txo_sum: u64,
}

#[derive(Debug, Clone)]
pub struct OracleClient {
    base_url: String,
    routes: Arc<Vec<Route>>,
    current_route: Arc<AtomicUsize>,
    policy: RetryPolicy,
    gate: RateGate,
}

impl OracleClient {

    pub fn new(config: OracleConfig) -> Result<Self> {
        let labels = if config.proxies.is_empty() {
            vec![DIRECT_ROUTE.to_string()]
        } else {
            config.proxies.clone()
        };

        let routes = labels
            .iter()
            .map(|label| Route::build(label, config.timeout))
            .collect::<Result<Vec<_>>>()?;

        Ok(OracleClient {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            routes: Arc::new(routes),
            current_route: Arc::new(AtomicUsize::new(0)),
            policy: config.retry,
            gate: RateGate::new(config.min_request_interval),
        })
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Looks up the balance of `address`, retrying per the [`RetryPolicy`].
    pub async fn query(&self, address: &str) -> std::result::Result<Balance, OracleError> {
        let route_count = self.routes.len();
        let mut route = self.current_route.load(Ordering::Relaxed) % route_count;
        let mut failed_routes = 0u32;
        let mut rate_limited = 0u32;
        let mut attempts = 0u32;

        loop {
            self.gate.wait().await;
            attempts += 1;

            let error = match self.fetch(&self.routes[route], address).await {
                Ok(balance) => return Ok(balance),
                Err(e) => e,
            };

            let failure = match Failure::of(&error) {
                Some(failure) => failure,
                None => return Err(error),
            };

            let attempt = match failure {
                Failure::RateLimited => {
                    rate_limited += 1;
                    rate_limited
                }
                _ => failed_routes + 1,
            };

            match self.policy.decide(failure, attempt) {
                RetryDecision::Backoff(delay) => {
                    tracing::warn!(
                        "⏳ Rate limited on route {}, retrying in {:?} ({}/{})",
                        self.routes[route].label,
                        delay,
                        rate_limited,
                        self.policy.max_rate_limit_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Rotate => {
                    failed_routes += 1;
                    tracing::warn!("⚠️ Route {} failed: {}", self.routes[route].label, error);
                    if failed_routes as usize >= route_count {
                        return Err(OracleError::Exhausted { attempts });
                    }
                    route = (route + 1) % route_count;
                    rate_limited = 0;
                    self.current_route.store(route, Ordering::Relaxed);
                }
                RetryDecision::GiveUp => {
                    return Err(match error {
                        OracleError::RateLimited { .. } => OracleError::RateLimited {
                            retries: rate_limited.saturating_sub(1),
                        },
                        other => other,
                    });
                }
            }
        }
    }

    async fn fetch(&self, route: &Route, address: &str) -> std::result::Result<Balance, OracleError> {
        let url = format!("{}/address/{}", self.base_url, address);

        let response = route
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::RateLimited { retries: 0 });
        }
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        let info: AddressInfo =
            serde_json::from_str(&body).map_err(|e| OracleError::Malformed(e.to_string()))?;

        Ok(Balance::from_sats(info.chain_stats.funded_txo_sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ADDRESS: &str = "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu";

    fn body(sats: u64) -> serde_json::Value {
        serde_json::json!({
            "address": ADDRESS,
            "chain_stats": {
                "funded_txo_count": 1,
                "funded_txo_sum": sats,
                "spent_txo_count": 0,
                "spent_txo_sum": 0,
                "tx_count": 1
            },
            "mempool_stats": {
                "funded_txo_count": 0,
                "funded_txo_sum": 0,
                "spent_txo_count": 0,
                "spent_txo_sum": 0,
                "tx_count": 0
            }
        })
    }

    fn test_config(base_url: &str) -> OracleConfig {
        OracleConfig {
            base_url: base_url.to_string(),
            proxies: Vec::new(),
            timeout: Duration::from_secs(5),
            min_request_interval: Duration::ZERO,
            retry: RetryPolicy {
                max_rate_limit_retries: 5,
                rate_limit_backoff: Duration::from_millis(200),
                retry_server_errors: true,
            },
        }
    }

    fn closed_port_proxy() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    #[test]
    fn test_balance_conversion() {
        let balance = Balance::from_sats(150_000_000);
        assert_eq!(balance.to_btc(), 1.5);
        assert_eq!(balance.to_string(), "1.50000000 BTC");
        assert!(Balance::from_sats(0).is_zero());
    }

    #[test]
    fn test_classification() {
        assert_eq!(Classification::from_result(&Ok(Balance::from_sats(0))), Classification::Zero);
        assert_eq!(
            Classification::from_result(&Ok(Balance::from_sats(1))),
            Classification::Funded(Balance::from_sats(1))
        );
        assert!(matches!(
            Classification::from_result(&Err(OracleError::Exhausted { attempts: 2 })),
            Classification::Unknown(_)
        ));
    }

    #[test]
    fn test_retry_policy_decisions() {
        let policy = RetryPolicy {
            max_rate_limit_retries: 2,
            rate_limit_backoff: Duration::from_millis(10),
            retry_server_errors: false,
        };
        assert_eq!(policy.decide(Failure::RateLimited, 1), RetryDecision::Backoff(Duration::from_millis(10)));
        assert_eq!(policy.decide(Failure::RateLimited, 2), RetryDecision::Backoff(Duration::from_millis(10)));
        assert_eq!(policy.decide(Failure::RateLimited, 3), RetryDecision::GiveUp);
        assert_eq!(policy.decide(Failure::Transport, 1), RetryDecision::Rotate);
        assert_eq!(policy.decide(Failure::ServerError(503), 1), RetryDecision::GiveUp);

        let lenient = RetryPolicy { retry_server_errors: true, ..policy };
        assert_eq!(lenient.decide(Failure::ServerError(503), 1), RetryDecision::Rotate);
    }

    #[tokio::test]
    async fn test_funded_balance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/address/{}", ADDRESS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(150_000_000)))
            .mount(&server)
            .await;

        let client = OracleClient::new(test_config(&server.uri())).unwrap();
        let balance = client.query(ADDRESS).await.unwrap();
        assert_eq!(balance.sats(), 150_000_000);
        assert_eq!(balance.to_btc(), 1.5);
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/address/{}", ADDRESS)))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/address/{}", ADDRESS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(0)))
            .mount(&server)
            .await;

        let client = OracleClient::new(test_config(&server.uri())).unwrap();
        let started = std::time::Instant::now();
        let result = client.query(ADDRESS).await;

        assert!(started.elapsed() >= Duration::from_millis(400));
        assert_eq!(Classification::from_result(&result), Classification::Zero);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.retry.max_rate_limit_retries = 2;
        config.retry.rate_limit_backoff = Duration::from_millis(10);

        let client = OracleClient::new(config).unwrap();
        let err = client.query(ADDRESS).await.unwrap_err();
        assert_eq!(err, OracleError::RateLimited { retries: 2 });
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_all_routes_fail() {
        let mut config = test_config("http://oracle.invalid");
        config.proxies = vec![closed_port_proxy(), closed_port_proxy()];

        let client = OracleClient::new(config).unwrap();
        let err = client.query(ADDRESS).await.unwrap_err();
        assert_eq!(err, OracleError::Exhausted { attempts: 2 });
    }

    #[tokio::test]
    async fn test_rotates_to_working_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(42)))
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.proxies = vec![closed_port_proxy(), DIRECT_ROUTE.to_string()];

        let client = OracleClient::new(config).unwrap();
        assert_eq!(client.route_count(), 2);
        assert_eq!(client.query(ADDRESS).await.unwrap().sats(), 42);
        // The working route sticks for the next query
        assert_eq!(client.query(ADDRESS).await.unwrap().sats(), 42);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_server_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.retry.retry_server_errors = false;

        let client = OracleClient::new(config).unwrap();
        assert_eq!(client.query(ADDRESS).await.unwrap_err(), OracleError::Status(503));
    }

    #[tokio::test]
    async fn test_server_error_exhausts_single_route() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = OracleClient::new(test_config(&server.uri())).unwrap();
        assert_eq!(
            client.query(ADDRESS).await.unwrap_err(),
            OracleError::Exhausted { attempts: 1 }
        );
    }

    #[tokio::test]
    async fn test_other_status_and_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/address/missing"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/address/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"chain_stats\":"))
            .mount(&server)
            .await;

        let client = OracleClient::new(test_config(&server.uri())).unwrap();
        assert_eq!(client.query("missing").await.unwrap_err(), OracleError::Status(400));
        assert!(matches!(
            client.query("garbled").await.unwrap_err(),
            OracleError::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn test_rate_gate_spaces_requests() {
        let gate = RateGate::new(Duration::from_millis(100));
        let started = std::time::Instant::now();
        gate.wait().await;
        let clone = gate.clone();
        clone.wait().await;
        gate.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let mut config = OracleConfig::default();
        config.proxies = vec!["not a url".to_string()];
        let err = OracleClient::new(config).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }
}
