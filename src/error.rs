use std::path::PathBuf;
use thiserror::Error;

use crate::oracle::OracleError;

pub type Result<T> = std::result::Result<T, ScanError>;

/// Coarse classification of every [`ScanError`], used to decide whether a
/// failure is local to one candidate or fatal for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Checksum,
    Derivation,
    OracleTransient,
    Persistence,
    Config,
}

#[derive(Error, Debug)]
pub enum ScanError {

    #[error("Wordlist file not found: {0}")]
    WordlistNotFound(PathBuf),

    #[error("Wordlist has {0} words, expected 2048")]
    InvalidWordlist(usize),

    #[error("Wordlist contains duplicate word '{0}'")]
    DuplicateWord(String),

    #[error("Invalid entropy size: {0} bytes. Must be 16")]
    InvalidEntropySize(usize),

    #[error("Invalid mnemonic length: {0} words. Must be 12")]
    InvalidMnemonicLength(usize),

    #[error("Word '{0}' not found in wordlist")]
    WordNotFound(String),

    #[error("Invalid checksum - mnemonic is corrupted or invalid")]
    InvalidChecksum,

    #[error("Suggested prefix must have 1 to 11 words, got {0}")]
    InvalidPrefixLength(usize),

    #[error("No checksum-valid completion found after {0} attempts")]
    CompletionExhausted(usize),

    #[error("HD derivation error: {0}")]
    DerivationError(String),

    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Invalid extended key: {0}")]
    InvalidExtendedKey(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Base58 error: {0}")]
    Base58(String),

    #[error("Bech32 error: {0}")]
    Bech32(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Random generation error: {0}")]
    RandomError(String),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Hex decode error: {0}")]
    HexError(#[from] hex::FromHexError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ScanError {

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::WordlistNotFound(_)
            | ScanError::InvalidWordlist(_)
            | ScanError::DuplicateWord(_)
            | ScanError::Config(_) => ErrorKind::Config,

            ScanError::InvalidChecksum | ScanError::CompletionExhausted(_) => ErrorKind::Checksum,

            ScanError::InvalidEntropySize(_)
            | ScanError::InvalidMnemonicLength(_)
            | ScanError::WordNotFound(_)
            | ScanError::InvalidPrefixLength(_)
            | ScanError::InvalidAddress(_)
            | ScanError::Base58(_)
            | ScanError::Bech32(_)
            | ScanError::HexError(_)
            | ScanError::InvalidExtendedKey(_) => ErrorKind::Input,

            ScanError::DerivationError(_)
            | ScanError::InvalidPath(_)
            | ScanError::CryptoError(_)
            | ScanError::RandomError(_) => ErrorKind::Derivation,

            ScanError::Oracle(_) => ErrorKind::OracleTransient,

            ScanError::Database(_)
            | ScanError::Persistence(_)
            | ScanError::IoError(_)
            | ScanError::JsonError(_) => ErrorKind::Persistence,
        }
    }

    /// Whether the run may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Config
    }
}

impl From<secp256k1::Error> for ScanError {
    fn from(err: secp256k1::Error) -> Self {
        ScanError::CryptoError(err.to_string())
    }
}
