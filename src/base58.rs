//! Base58 and Base58Check (Bitcoin alphabet).

use crate::error::{Result, ScanError};
use crate::hash::sha256d;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const CHECKSUM_LEN: usize = 4;

fn digit_value(c: u8) -> Option<u8> {
    ALPHABET.iter().position(|&a| a == c).map(|i| i as u8)
}

pub fn encode(data: &[u8]) -> String {
    let zeros = data.iter().take_while(|&&b| b == 0).count();

    // little-endian base-58 digits of the big-endian input
    let mut digits: Vec<u8> = Vec::with_capacity(data.len() * 138 / 100 + 1);
    for &byte in &data[zeros..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat('1').take(zeros));
    out.extend(digits.iter().rev().map(|&d| ALPHABET[d as usize] as char));
    out
}

pub fn decode(input: &str) -> Result<Vec<u8>> {
    let bytes = input.as_bytes();
    let ones = bytes.iter().take_while(|&&c| c == b'1').count();

    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    for (pos, &c) in bytes.iter().enumerate().skip(ones) {
        let value = digit_value(c).ok_or_else(|| {
            ScanError::Base58(format!("invalid character '{}' at position {}", c as char, pos))
        })?;

        let mut carry = value as u32;
        for byte in out.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            out.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let mut result = vec![0u8; ones];
    result.extend(out.iter().rev());
    Ok(result)
}

pub fn encode_check(payload: &[u8]) -> String {
    let checksum = sha256d(payload);
    let mut data = Vec::with_capacity(payload.len() + CHECKSUM_LEN);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    encode(&data)
}

/// Decodes a Base58Check string and returns the payload without checksum.
pub fn decode_check(input: &str) -> Result<Vec<u8>> {
    let mut data = decode(input)?;
    if data.len() < CHECKSUM_LEN {
        return Err(ScanError::Base58(format!("too short for checksum: {} bytes", data.len())));
    }

    let split = data.len() - CHECKSUM_LEN;
    let expected = sha256d(&data[..split]);
    if data[split..] != expected[..CHECKSUM_LEN] {
        return Err(ScanError::Base58("checksum mismatch".to_string()));
    }

    data.truncate(split);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vectors() {
        let vectors: &[(&str, &str)] = &[
            ("", ""),
            ("61", "2g"),
            ("626262", "a3gV"),
            ("636363", "aPEr"),
            ("73696d706c792061206c6f6e6720737472696e67", "2cFupjhnEsSn59qHXstmK2ffpLv2"),
            ("00", "1"),
            ("0000", "11"),
            ("00000000000000000000", "1111111111"),
        ];

        for (hex_in, expected) in vectors {
            let bytes = hex::decode(hex_in).unwrap();
            assert_eq!(&encode(&bytes), expected);
            assert_eq!(decode(expected).unwrap(), bytes);
        }
    }

    #[test]
    fn test_rejects_invalid_characters() {
        for bad in ["0", "O", "I", "l", "abc+"] {
            assert!(decode(bad).is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_check_detects_corruption() {
        let encoded = encode_check(&[0x00, 0x01, 0x02, 0x03]);
        assert_eq!(decode_check(&encoded).unwrap(), vec![0x00, 0x01, 0x02, 0x03]);

        let mut corrupted = encoded.into_bytes();
        let last = corrupted.len() - 1;
        corrupted[last] = if corrupted[last] == b'2' { b'3' } else { b'2' };
        let corrupted = String::from_utf8(corrupted).unwrap();
        assert!(decode_check(&corrupted).is_err());
    }

    proptest! {
        #[test]
        fn prop_matches_bs58(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(encode(&data), bs58::encode(&data).into_string());
        }

        #[test]
        fn prop_check_matches_bs58(data in proptest::collection::vec(any::<u8>(), 0..48)) {
            prop_assert_eq!(encode_check(&data), bs58::encode(&data).with_check().into_string());
        }
    }
}
