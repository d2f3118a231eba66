use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    error::{Result, ScanError},
    oracle::{OracleConfig, RetryPolicy, DEFAULT_BASE_URL},
    orchestrator::{ScanPolicy, StoreRetry},
    wallet::Network,
};

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub wordlist_path: PathBuf,
    pub oracle: OracleConfig,
    pub used_on_failure: bool,
    pub store_retry: StoreRetry,
    pub workers: usize,
    pub network: Network,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            database_url: None,
            database_max_connections: 5,
            wordlist_path: PathBuf::from("english.txt"),
            oracle: OracleConfig::default(),
            used_on_failure: true,
            store_retry: StoreRetry::default(),
            workers: 1,
            network: Network::Bitcoin,
        }
    }
}

impl ScannerConfig {

    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = ScannerConfig::default();

        let proxies = get("ORACLE_PROXIES")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let oracle = OracleConfig {
            base_url: get("ORACLE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            proxies,
            timeout: Duration::from_secs(parse_or(&get, "ORACLE_TIMEOUT_SECS", 10)?),
            min_request_interval: Duration::from_millis(parse_or(&get, "ORACLE_MIN_INTERVAL_MS", 1_000)?),
            retry: RetryPolicy {
                max_rate_limit_retries: parse_or(&get, "ORACLE_MAX_RATE_LIMIT_RETRIES", 5)?,
                rate_limit_backoff: Duration::from_millis(parse_or(&get, "ORACLE_RATE_LIMIT_BACKOFF_MS", 5_000)?),
                retry_server_errors: parse_bool_or(&get, "ORACLE_RETRY_SERVER_ERRORS", true)?,
            },
        };

        let workers: usize = parse_or(&get, "SCAN_WORKERS", defaults.workers)?;
        if workers == 0 {
            return Err(ScanError::Config("SCAN_WORKERS must be at least 1".to_string()));
        }

        let store_retry = StoreRetry {
            attempts: parse_or(&get, "SCAN_STORE_RETRIES", defaults.store_retry.attempts)?,
            backoff: Duration::from_millis(parse_or(&get, "SCAN_STORE_BACKOFF_MS", 1_000)?),
        };
        if store_retry.attempts == 0 {
            return Err(ScanError::Config("SCAN_STORE_RETRIES must be at least 1".to_string()));
        }

        Ok(ScannerConfig {
            database_url: get("DATABASE_URL"),
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            wordlist_path: get("WORDLIST_PATH").map(PathBuf::from).unwrap_or(defaults.wordlist_path),
            oracle,
            used_on_failure: parse_bool_or(&get, "SCAN_USED_ON_FAILURE", true)?,
            store_retry,
            workers,
            network: parse_or(&get, "NETWORK", defaults.network)?,
        })
    }

    pub fn scan_policy(&self, max_items: Option<u64>) -> ScanPolicy {
        ScanPolicy {
            used_on_failure: self.used_on_failure,
            max_items,
            network: self.network,
            store_retry: self.store_retry,
        }
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ScanError::Config("DATABASE_URL is not set".to_string()))
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ScanError::Config(format!("{}='{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool_or<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(ScanError::Config(format!("{}='{}' is not a boolean", key, v))),
    }
}
