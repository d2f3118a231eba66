use crate::wordlist::Wordlist;

pub fn format_btc(satoshis: u64) -> String {
    let btc = satoshis as f64 / 100_000_000.0;
    format!("{:.8} BTC", btc)
}

/// Shortens a long key or address for display, keeping both ends.
pub fn abbreviate(value: &str, keep: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= keep * 2 + 3 {
        return value.to_string();
    }
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Splits a user-supplied prefix such as `"legal, winner thank"` into
/// lowercase words.
pub fn split_words(input: &str) -> Vec<String> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Words of `input` that are not in the word list.
pub fn unknown_words<'a>(input: &'a [String], wordlist: &Wordlist) -> Vec<&'a str> {
    input
        .iter()
        .map(String::as_str)
        .filter(|w| !wordlist.contains(w))
        .collect()
}
