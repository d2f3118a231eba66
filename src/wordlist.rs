use crate::error::{Result, ScanError};
use std::collections::HashMap;
use std::path::Path;

pub const WORDLIST_SIZE: usize = 2048;

/// The 2048-word BIP39 list; a word's position is its 11-bit code.
#[derive(Debug, Clone)]
pub struct Wordlist {
    words: Vec<String>,
    word_to_index: HashMap<String, u16>,
}

impl Wordlist {

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ScanError::WordlistNotFound(path.to_path_buf()),
            _ => ScanError::IoError(e),
        })?;

        let wordlist = Self::parse(&content)?;
        tracing::debug!("Loaded wordlist from {}", path.display());
        Ok(wordlist)
    }

    /// One word per line; blank lines and surrounding whitespace are ignored.
    pub fn parse(content: &str) -> Result<Self> {
        Self::from_words(content.lines().map(str::trim).filter(|w| !w.is_empty()))
    }

    pub fn from_words<I, S>(words: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();

        if words.len() != WORDLIST_SIZE {
            return Err(ScanError::InvalidWordlist(words.len()));
        }

        let mut word_to_index = HashMap::with_capacity(WORDLIST_SIZE);
        for (i, word) in words.iter().enumerate() {
            if word_to_index.insert(word.clone(), i as u16).is_some() {
                return Err(ScanError::DuplicateWord(word.clone()));
            }
        }

        Ok(Wordlist {
            words,
            word_to_index,
        })
    }

    pub fn get_word(&self, index: usize) -> Option<&str> {
        self.words.get(index).map(|s| s.as_str())
    }

    pub fn get_index(&self, word: &str) -> Option<u16> {
        self.word_to_index.get(word).copied()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.word_to_index.contains_key(word)
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}
