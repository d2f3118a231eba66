//! Candidate pipelines: random generation (optionally around a suggested
//! prefix) and import of an existing phrase file.

use std::path::Path;
use std::sync::Arc;

use crate::{
    error::{Result, ScanError},
    mnemonic::{Mnemonic, DEFAULT_COMPLETION_ATTEMPTS},
    queue::{NewCandidate, WorkItem, WorkQueue},
    results::ResultEntry,
    wallet::{DerivedAddress, Network, Scheme, Wallet},
    wordlist::Wordlist,
};

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub schemes: Vec<Scheme>,
    pub network: Network,
    pub passphrase: String,
    /// Leading words every generated phrase starts with.
    pub prefix: Vec<String>,
    pub max_attempts: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        GeneratorOptions {
            schemes: Scheme::ALL.to_vec(),
            network: Network::Bitcoin,
            passphrase: String::new(),
            prefix: Vec::new(),
            max_attempts: DEFAULT_COMPLETION_ATTEMPTS,
        }
    }
}

/// A phrase with its first receive address under each requested scheme.
#[derive(Clone)]
pub struct GeneratedWallet {
    pub phrase: String,
    pub addresses: Vec<DerivedAddress>,
}

impl GeneratedWallet {

    pub fn candidates(&self) -> impl Iterator<Item = NewCandidate> + '_ {
        self.addresses
            .iter()
            .map(move |derived| NewCandidate::from_derived(derived, &self.phrase))
    }

    pub fn result_entries(&self) -> impl Iterator<Item = ResultEntry> + '_ {
        self.addresses.iter().map(move |derived| ResultEntry {
            phrase: self.phrase.clone(),
            address: derived.address.to_string(),
        })
    }

    /// Queues every address. A rejected candidate is logged and counted
    /// and the rest are still queued.
    pub async fn enqueue(&self, queue: &WorkQueue) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        for candidate in self.candidates() {
            match queue.enqueue(&candidate).await {
                Ok(item) => report.queued.push(item),
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        "❌ Failed to queue {} ({}): {}",
                        candidate.address,
                        candidate.scheme,
                        e
                    );
                }
            }
        }
        report
    }
}

#[derive(Debug, Default)]
pub struct EnqueueReport {
    pub queued: Vec<WorkItem>,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub accepted: usize,
    pub rejected: usize,
}

pub struct Generator {
    wordlist: Arc<Wordlist>,
    options: GeneratorOptions,
}

impl Generator {

    pub fn new(wordlist: Arc<Wordlist>, options: GeneratorOptions) -> Result<Self> {
        if options.schemes.is_empty() {
            return Err(ScanError::Config("no derivation schemes selected".to_string()));
        }
        Ok(Generator { wordlist, options })
    }

    pub fn next_mnemonic(&self) -> Result<Mnemonic> {
        if self.options.prefix.is_empty() {
            return Mnemonic::generate(&self.wordlist);
        }

        let prefix: Vec<&str> = self.options.prefix.iter().map(String::as_str).collect();
        Mnemonic::complete_prefix(&prefix, &self.wordlist, self.options.max_attempts, &mut rand::thread_rng())
    }

    pub fn derive(&self, mnemonic: &Mnemonic) -> Result<GeneratedWallet> {
        let wallet = Wallet::from_mnemonic(mnemonic, &self.options.passphrase, self.options.network)?;
        Ok(GeneratedWallet {
            phrase: mnemonic.phrase(),
            addresses: wallet.derive_all(&self.options.schemes)?,
        })
    }

    pub fn generate_one(&self) -> Result<GeneratedWallet> {
        let mnemonic = self.next_mnemonic()?;
        self.derive(&mnemonic)
    }

    /// Validates and derives each phrase; invalid ones are logged by line
    /// number and skipped.
    pub fn import_phrases(&self, phrases: &[String]) -> (Vec<GeneratedWallet>, ImportReport) {
        let mut wallets = Vec::new();
        let mut report = ImportReport::default();

        for (line, phrase) in phrases.iter().enumerate() {
            let derived = Mnemonic::from_phrase(phrase, &self.wordlist).and_then(|m| self.derive(&m));
            match derived {
                Ok(wallet) => {
                    report.accepted += 1;
                    wallets.push(wallet);
                }
                Err(e) => {
                    report.rejected += 1;
                    tracing::warn!("⚠️ Skipping phrase #{}: {}", line + 1, e);
                }
            }
        }

        (wallets, report)
    }
}

/// One phrase per line; lines are trimmed and blank lines skipped.
pub fn read_phrases(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
