use crate::{
    entropy::{Entropy, CHECKSUM_BITS, ENTROPY_BYTES},
    error::{Result, ScanError},
    seed::Seed,
    wordlist::Wordlist,
};
use rand::seq::SliceRandom;
use rand::Rng;
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, ZeroizeOnDrop};
use std::fmt;

pub const WORD_COUNT: usize = 12;

/// Attempts allowed when completing a suggested prefix. Each attempt
/// passes the checksum with probability 1/16.
pub const DEFAULT_COMPLETION_ATTEMPTS: usize = 1_000;

/// A checksum-valid 12-word BIP39 mnemonic. Only constructible through
/// encoding or validation, so every value can be safely derived.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Mnemonic {
    words: Vec<String>,
    entropy: Entropy,
}

impl Mnemonic {

    pub fn generate(wordlist: &Wordlist) -> Result<Self> {
        let entropy = Entropy::generate()?;
        Self::from_entropy(entropy, wordlist)
    }

    pub fn from_entropy(entropy: Entropy, wordlist: &Wordlist) -> Result<Self> {
        let words = entropy
            .word_indices()
            .iter()
            .map(|&index| {
                wordlist
                    .get_word(index as usize)
                    .map(str::to_string)
                    .ok_or_else(|| ScanError::WordNotFound(format!("index_{}", index)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Mnemonic { words, entropy })
    }

    pub fn from_phrase(phrase: &str, wordlist: &Wordlist) -> Result<Self> {

        let normalized = phrase.nfkd().collect::<String>();
        let words: Vec<String> = normalized
            .split_whitespace()
            .map(|w| w.to_string())
            .collect();

        if words.len() != WORD_COUNT {
            return Err(ScanError::InvalidMnemonicLength(words.len()));
        }

        let mut bits = Vec::with_capacity(WORD_COUNT * 11);
        for word in &words {
            let index = wordlist
                .get_index(word)
                .ok_or_else(|| ScanError::WordNotFound(word.clone()))?;

            for i in (0..11).rev() {
                bits.push((index >> i) & 1 == 1);
            }
        }

        let mut entropy_data = [0u8; ENTROPY_BYTES];
        for (byte, chunk) in entropy_data.iter_mut().zip(bits.chunks_exact(8)) {
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    *byte |= 1 << (7 - i);
                }
            }
        }

        let mut encoded_checksum = 0u8;
        for &bit in &bits[ENTROPY_BYTES * 8..] {
            encoded_checksum = (encoded_checksum << 1) | bit as u8;
        }
        debug_assert_eq!(bits.len() - ENTROPY_BYTES * 8, CHECKSUM_BITS);

        let entropy = Entropy::from_bytes(&entropy_data)?;
        entropy_data.zeroize();

        if entropy.checksum() != encoded_checksum {
            return Err(ScanError::InvalidChecksum);
        }

        Ok(Mnemonic { words, entropy })
    }

    /// Fills the words after `prefix` with random distinct words from the
    /// list until the checksum passes, giving up after `max_attempts`.
    pub fn complete_prefix<R: Rng + ?Sized>(
        prefix: &[&str],
        wordlist: &Wordlist,
        max_attempts: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if prefix.is_empty() || prefix.len() >= WORD_COUNT {
            return Err(ScanError::InvalidPrefixLength(prefix.len()));
        }

        let prefix: Vec<String> = prefix
            .iter()
            .map(|w| w.trim().nfkd().collect::<String>())
            .collect();
        if let Some(unknown) = prefix.iter().find(|w| !wordlist.contains(w)) {
            return Err(ScanError::WordNotFound(unknown.clone()));
        }

        let remaining = WORD_COUNT - prefix.len();
        for attempt in 1..=max_attempts {
            let mut candidate = prefix.clone();
            candidate.extend(
                wordlist
                    .words()
                    .choose_multiple(rng, remaining)
                    .cloned(),
            );

            match Self::from_phrase(&candidate.join(" "), wordlist) {
                Ok(mnemonic) => {
                    tracing::debug!("Prefix completed after {} attempt(s)", attempt);
                    return Ok(mnemonic);
                }
                Err(ScanError::InvalidChecksum) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(ScanError::CompletionExhausted(max_attempts))
    }

    pub fn phrase(&self) -> String {
        self.words.join(" ")
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn entropy(&self) -> &Entropy {
        &self.entropy
    }

    pub fn to_seed(&self, passphrase: &str) -> Seed {
        Seed::from_mnemonic(&self.phrase(), passphrase)
    }

    pub fn validate(phrase: &str, wordlist: &Wordlist) -> bool {
        Self::from_phrase(phrase, wordlist).is_ok()
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.phrase())
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mnemonic")
            .field("word_count", &self.word_count())
            .field("entropy", &"<REDACTED>")
            .field("words", &"<REDACTED>")
            .finish()
    }
}
