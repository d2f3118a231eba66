#![forbid(unsafe_code)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use hd_scanner::{
    config::ScannerConfig,
    generator::{read_phrases, GeneratedWallet, Generator, GeneratorOptions},
    logging::init_logging,
    prelude::*,
    results::ResultsFile,
    utils::{abbreviate, split_words, unknown_words},
    OracleClient, Orchestrator, PgStore, ResultSink, Store,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hd-scanner")]
#[command(about = "BIP-39 HD wallet candidate generator and balance scanner", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// bitcoin or testnet; overrides NETWORK
    #[arg(short, long, global = true)]
    network: Option<String>,

    /// Word list file; overrides WORDLIST_PATH
    #[arg(short, long, global = true)]
    wordlist: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {

    /// Generate random mnemonics and queue their addresses
    Generate {

        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Leading words every phrase must start with, e.g. "legal winner"
        #[arg(long)]
        prefix: Option<String>,

        #[arg(short, long, default_value = "bip44,bip49,bip84")]
        schemes: String,

        #[arg(short, long)]
        passphrase: Option<String>,

        #[arg(long, default_value_t = hd_scanner::mnemonic::DEFAULT_COMPLETION_ATTEMPTS)]
        max_attempts: usize,

        /// Append {phrase, address} pairs to this JSON file
        #[arg(short, long)]
        results: Option<PathBuf>,

        /// Do not write to the database
        #[arg(long)]
        no_store: bool,
    },

    /// Derive and queue addresses for every phrase in a file
    Import {

        #[arg(long, default_value = "source.txt")]
        source: PathBuf,

        #[arg(short, long, default_value = "bip44,bip49,bip84")]
        schemes: String,

        #[arg(short, long)]
        passphrase: Option<String>,

        #[arg(short, long)]
        results: Option<PathBuf>,

        #[arg(long)]
        no_store: bool,
    },

    /// Check queued addresses against the balance oracle until drained
    Scan {

        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Stop after this many addresses
        #[arg(short, long)]
        limit: Option<u64>,

        /// Funded addresses the database rejects are saved here
        #[arg(long, default_value = "unrecorded.json")]
        fallback: PathBuf,
    },

    Derive {

        #[arg(short, long)]
        mnemonic: String,

        #[arg(short, long, default_value = "bip84")]
        scheme: String,

        #[arg(short, long, default_value = "0")]
        account: u32,

        #[arg(long, default_value = "0")]
        change: u32,

        #[arg(short, long, default_value = "0")]
        index: u32,

        #[arg(short, long)]
        passphrase: Option<String>,
    },

    Validate {

        #[arg(short, long)]
        mnemonic: String,
    },

    /// Query the oracle for a single address
    Check {

        #[arg(short, long)]
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();

    let mut config = ScannerConfig::from_env()?;
    if let Some(network) = &cli.network {
        config.network = network.parse()?;
    }
    if let Some(path) = cli.wordlist {
        config.wordlist_path = path;
    }

    match cli.command {
        Commands::Generate { count, prefix, schemes, passphrase, max_attempts, results, no_store } => {
            let wordlist = load_wordlist(&config)?;
            let prefix = prefix.map(|p| split_words(&p)).unwrap_or_default();
            let unknown = unknown_words(&prefix, &wordlist);
            if !unknown.is_empty() {
                anyhow::bail!("prefix words not in the word list: {}", unknown.join(", "));
            }

            let options = GeneratorOptions {
                schemes: Scheme::parse_list(&schemes)?,
                network: config.network,
                passphrase: passphrase.unwrap_or_default(),
                prefix,
                max_attempts,
            };
            let generator = Generator::new(wordlist, options)?;
            let queue = open_queue(&config, no_store).await?;
            let mut results = results.map(ResultsFile::open).transpose()?;

            generate(&generator, count, queue.as_ref(), results.as_mut()).await?;
        }
        Commands::Import { source, schemes, passphrase, results, no_store } => {
            let wordlist = load_wordlist(&config)?;
            let options = GeneratorOptions {
                schemes: Scheme::parse_list(&schemes)?,
                network: config.network,
                passphrase: passphrase.unwrap_or_default(),
                ..GeneratorOptions::default()
            };
            let generator = Generator::new(wordlist, options)?;
            let queue = open_queue(&config, no_store).await?;
            let mut results = results.map(ResultsFile::open).transpose()?;

            import(&generator, &source, queue.as_ref(), results.as_mut()).await?;
        }
        Commands::Scan { workers, limit, fallback } => {
            scan(&config, workers.unwrap_or(config.workers), limit, &fallback).await?;
        }
        Commands::Derive { mnemonic, scheme, account, change, index, passphrase } => {
            let wordlist = load_wordlist(&config)?;
            derive(&wordlist, &config, &mnemonic, &scheme, account, change, index, passphrase)?;
        }
        Commands::Validate { mnemonic } => {
            let wordlist = load_wordlist(&config)?;
            validate(&wordlist, &mnemonic);
        }
        Commands::Check { address } => {
            check(&config, &address).await?;
        }
    }

    Ok(())
}

fn load_wordlist(config: &ScannerConfig) -> anyhow::Result<Arc<Wordlist>> {
    let wordlist = Wordlist::load(&config.wordlist_path)
        .with_context(|| format!("loading word list from {}", config.wordlist_path.display()))?;
    Ok(Arc::new(wordlist))
}

async fn open_store(config: &ScannerConfig) -> anyhow::Result<Arc<PgStore>> {
    let store = PgStore::connect(config.require_database_url()?, config.database_max_connections).await?;
    store.init_schema().await?;
    Ok(Arc::new(store))
}

async fn open_queue(config: &ScannerConfig, no_store: bool) -> anyhow::Result<Option<WorkQueue>> {
    if no_store {
        return Ok(None);
    }
    let store: Arc<dyn Store> = open_store(config).await?;
    Ok(Some(WorkQueue::new(store)))
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Returns the number of candidates the queue rejected.
async fn emit(
    wallet: &GeneratedWallet,
    queue: Option<&WorkQueue>,
    results: Option<&mut ResultsFile>,
) -> anyhow::Result<usize> {
    let mut failed = 0;
    if let Some(queue) = queue {
        failed = wallet.enqueue(queue).await.failed;
    }
    if let Some(results) = results {
        for entry in wallet.result_entries() {
            results.push(entry)?;
        }
    }
    Ok(failed)
}

async fn generate(
    generator: &Generator,
    count: usize,
    queue: Option<&WorkQueue>,
    mut results: Option<&mut ResultsFile>,
) -> anyhow::Result<()> {
    println!("\n{}", "🔐 Candidate Generator".cyan().bold());
    println!("{}", "═".repeat(50).cyan());

    let pb = progress_bar(count as u64);
    let mut failed = 0;
    for _ in 0..count {
        let wallet = generator.generate_one()?;
        failed += emit(&wallet, queue, results.as_deref_mut()).await?;

        for derived in &wallet.addresses {
            pb.println(format!(
                "  {} {}",
                format!("{}:", derived.path.scheme).white().bold(),
                derived.address.to_string().yellow()
            ));
        }
        pb.inc(1);
    }
    pb.finish_with_message("✅ done");

    summary(count, failed, queue, results.as_deref());
    Ok(())
}

async fn import(
    generator: &Generator,
    source: &Path,
    queue: Option<&WorkQueue>,
    mut results: Option<&mut ResultsFile>,
) -> anyhow::Result<()> {
    println!("\n{}", "📥 Phrase Import".cyan().bold());
    println!("{}", "═".repeat(50).cyan());

    let phrases = read_phrases(source).with_context(|| format!("reading {}", source.display()))?;
    let (wallets, report) = generator.import_phrases(&phrases);

    let pb = progress_bar(wallets.len() as u64);
    let mut failed = 0;
    for wallet in &wallets {
        failed += emit(wallet, queue, results.as_deref_mut()).await?;
        pb.inc(1);
    }
    pb.finish_with_message("✅ done");

    println!("Accepted: {}", report.accepted.to_string().green());
    if report.rejected > 0 {
        println!("Rejected: {}", report.rejected.to_string().red());
    }
    summary(report.accepted, failed, queue, results.as_deref());
    Ok(())
}

fn summary(wallets: usize, failed: usize, queue: Option<&WorkQueue>, results: Option<&ResultsFile>) {
    println!("\n{} phrase(s) processed", wallets.to_string().green().bold());
    if queue.is_some() {
        println!("Queued for scanning in the database");
        if failed > 0 {
            println!("Failed to queue: {} address(es), see the log", failed.to_string().red());
        }
    }
    if let Some(results) = results {
        println!("Results saved to {}", results.path().display().to_string().green());
    }
}

async fn scan(config: &ScannerConfig, workers: usize, limit: Option<u64>, fallback: &Path) -> anyhow::Result<()> {
    println!("\n{}", "🔍 Balance Scanner".cyan().bold());
    println!("{}", "═".repeat(50).cyan());

    let wordlist = load_wordlist(config)?;
    let store = open_store(config).await?;
    let store: Arc<dyn Store> = store;
    let queue = WorkQueue::new(store.clone());
    println!("Pending addresses: {}", queue.pending().await?.to_string().yellow());

    let orchestrator = Orchestrator::new(
        queue,
        OracleClient::new(config.oracle.clone())?,
        ResultSink::new(store),
        wordlist,
        config.scan_policy(limit),
    )
    .with_fallback(ResultsFile::open(fallback)?);

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the current address");
            stop.stop();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("scanning with {} worker(s)...", workers));
    spinner.enable_steady_tick(Duration::from_millis(120));
    let report = orchestrator.run_workers(workers).await;
    spinner.finish_and_clear();
    let report = report?;

    println!("\n{}", "📊 SCAN REPORT".green().bold());
    println!("{}", "─".repeat(50).green());
    println!("Checked:  {}", report.claimed);
    println!("Zero:     {}", report.zero);
    println!("Funded:   {}", report.funded.to_string().green().bold());
    println!("Unknown:  {}", report.unknown.to_string().yellow());
    if report.requeued > 0 {
        println!("Requeued: {}", report.requeued);
    }
    if report.derivation_failures + report.persistence_failures > 0 {
        println!(
            "Failures: {} derivation, {} persistence",
            report.derivation_failures.to_string().red(),
            report.persistence_failures.to_string().red()
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn derive(
    wordlist: &Wordlist,
    config: &ScannerConfig,
    phrase: &str,
    scheme: &str,
    account: u32,
    change: u32,
    index: u32,
    passphrase: Option<String>,
) -> anyhow::Result<()> {
    println!("\n{}", "🔍 Address Derivation".cyan().bold());
    println!("{}", "═".repeat(50).cyan());

    let mnemonic = Mnemonic::from_phrase(phrase, wordlist)?;
    let wallet = Wallet::from_mnemonic(&mnemonic, &passphrase.unwrap_or_default(), config.network)?;
    let path = HDPath::new(scheme.parse()?, config.network)
        .with_account(account)
        .with_change(change)
        .with_index(index);
    let derived = wallet.derive_address(&path)?;

    println!("\n{}", "📍 DERIVED ADDRESS".green().bold());
    println!("{}", "─".repeat(50).green());
    println!("Scheme: {}", path.scheme.description());
    println!("Path: {}", path.to_string().cyan());
    println!("Address: {}", derived.address.to_string().yellow().bold());
    println!("Account xpub: {}", derived.xpub.blue());
    println!("Account xprv: {}", abbreviate(&derived.xprv, 8).red().dimmed());
    println!("  {}", "(full private key hidden)".white().dimmed());
    Ok(())
}

fn validate(wordlist: &Wordlist, phrase: &str) {
    println!("\n{}", "✔️  Mnemonic Validator".cyan().bold());
    println!("{}", "═".repeat(50).cyan());

    match Mnemonic::from_phrase(phrase, wordlist) {
        Ok(mnemonic) => {
            println!("\n✅ {} Valid mnemonic!", "SUCCESS:".green().bold());
            println!("Word count: {}", mnemonic.word_count());
            println!("Checksum: Valid ✓");
        }
        Err(e) => {
            println!("\n❌ {} Invalid mnemonic!", "ERROR:".red().bold());
            println!("Reason: {}", e.to_string().red());
        }
    }
}

async fn check(config: &ScannerConfig, address: &str) -> anyhow::Result<()> {
    let parsed = Address::parse(address, config.network)?;
    let client = OracleClient::new(config.oracle.clone())?;

    match client.query(parsed.as_str()).await {
        Ok(balance) if balance.is_zero() => {
            println!("{} {}", parsed.to_string().yellow(), "has no funds".white().dimmed());
        }
        Ok(balance) => {
            println!("💰 {} {}", parsed.to_string().yellow(), balance.to_string().green().bold());
        }
        Err(e) => {
            println!("❌ {} {}", "ERROR:".red().bold(), e.to_string().red());
        }
    }
    Ok(())
}
