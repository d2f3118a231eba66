#![forbid(unsafe_code)]

pub mod address;
pub mod base58;
pub mod bech32;
pub mod bip32;
pub mod config;
pub mod entropy;
pub mod error;
pub mod generator;
pub mod hash;
pub mod logging;
pub mod mnemonic;
pub mod oracle;
pub mod orchestrator;
pub mod queue;
pub mod results;
pub mod seed;
pub mod sink;
pub mod store;
pub mod utils;
pub mod wallet;
pub mod wordlist;

pub use address::Address;
pub use bip32::{ChildNumber, DerivationPath, ExtendedPrivKey, ExtendedPubKey};
pub use config::ScannerConfig;
pub use entropy::Entropy;
pub use error::{ErrorKind, Result, ScanError};
pub use mnemonic::Mnemonic;
pub use oracle::{Balance, Classification, OracleClient, OracleConfig, OracleError, RetryPolicy};
pub use orchestrator::{Orchestrator, ScanPolicy, ScanReport, StopHandle, StoreRetry};
pub use queue::{NewCandidate, WorkItem, WorkQueue};
pub use seed::Seed;
pub use sink::{BalanceRecord, ResultSink};
pub use store::{MemoryStore, PgStore, Store};
pub use wallet::{DerivedAddress, HDPath, Network, Scheme, Wallet};
pub use wordlist::Wordlist;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use crate::{
        Address, Balance, Mnemonic, Network, Result, Scheme,
        Seed, Wallet, HDPath, Wordlist, WorkQueue,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
    }
}
