#![allow(dead_code)]

use hd_scanner::Wordlist;
use std::sync::Arc;

pub const ABANDON_ABOUT: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// The canonical BIP39 English list, taken from an independent crate.
pub fn english() -> Arc<Wordlist> {
    let words = bip39::Language::English.word_list().iter().copied();
    Arc::new(Wordlist::from_words(words).unwrap())
}

pub fn esplora_body(sats: u64) -> serde_json::Value {
    serde_json::json!({
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
