//! Bech32 / Bech32m segwit address encoding (BIP173, BIP350).

use crate::error::{Result, ScanError};

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

const GENERATORS: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];

const CHECKSUM_LEN: usize = 6;

const MAX_LENGTH: usize = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Witness version 0.
    Bech32,
    /// Witness versions 1 through 16.
    Bech32m,
}

impl Variant {

    fn constant(self) -> u32 {
        match self {
            Variant::Bech32 => 1,
            Variant::Bech32m => 0x2bc830a3,
        }
    }

    pub fn for_witness_version(version: u8) -> Self {
        if version == 0 { Variant::Bech32 } else { Variant::Bech32m }
    }
}

fn polymod(values: &[u8]) -> u32 {
    let mut chk: u32 = 1;
    for &v in values {
        let top = chk >> 25;
        chk = ((chk & 0x1ffffff) << 5) ^ v as u32;
        for (i, generator) in GENERATORS.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= generator;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 2 + 1);
    out.extend(bytes.iter().map(|b| b >> 5));
    out.push(0);
    out.extend(bytes.iter().map(|b| b & 0x1f));
    out
}

fn create_checksum(hrp: &str, data: &[u8], variant: Variant) -> [u8; CHECKSUM_LEN] {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; CHECKSUM_LEN]);
    let pm = polymod(&values) ^ variant.constant();

    let mut checksum = [0u8; CHECKSUM_LEN];
    for (i, c) in checksum.iter_mut().enumerate() {
        *c = ((pm >> (5 * (5 - i))) & 0x1f) as u8;
    }
    checksum
}

fn verify_checksum(hrp: &str, data: &[u8]) -> Option<Variant> {
    let mut values = hrp_expand(hrp);
    values.extend_from_slice(data);
    match polymod(&values) {
        c if c == Variant::Bech32.constant() => Some(Variant::Bech32),
        c if c == Variant::Bech32m.constant() => Some(Variant::Bech32m),
        _ => None,
    }
}

/// Regroups a bit stream from `from`-bit to `to`-bit groups.
pub fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max_value: u32 = (1 << to) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &value in data {
        if (value as u32) >> from != 0 {
            return Err(ScanError::Bech32(format!("value {} exceeds {} bits", value, from)));
        }
        acc = (acc << from) | value as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max_value) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max_value) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max_value) != 0 {
        return Err(ScanError::Bech32("invalid padding".to_string()));
    }

    Ok(out)
}

fn check_hrp(hrp: &str) -> Result<()> {
    if hrp.is_empty() || hrp.bytes().any(|b| !(33..=126).contains(&b) || b.is_ascii_uppercase()) {
        return Err(ScanError::Bech32(format!("invalid human-readable part '{}'", hrp.escape_debug())));
    }
    Ok(())
}

pub fn encode(hrp: &str, data: &[u8], variant: Variant) -> Result<String> {
    check_hrp(hrp)?;
    if hrp.len() + 1 + data.len() + CHECKSUM_LEN > MAX_LENGTH {
        return Err(ScanError::Bech32("encoded string too long".to_string()));
    }

    let checksum = create_checksum(hrp, data, variant);
    let mut out = String::with_capacity(hrp.len() + 1 + data.len() + CHECKSUM_LEN);
    out.push_str(hrp);
    out.push('1');
    for &d in data.iter().chain(checksum.iter()) {
        out.push(CHARSET[d as usize] as char);
    }
    Ok(out)
}

/// Decodes a bech32 string into its lowercase HRP, 5-bit data (checksum
/// stripped) and detected variant.
pub fn decode(input: &str) -> Result<(String, Vec<u8>, Variant)> {
    if input.len() > MAX_LENGTH {
        return Err(ScanError::Bech32("string too long".to_string()));
    }
    let has_lower = input.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = input.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(ScanError::Bech32("mixed case".to_string()));
    }

    let lowered = input.to_ascii_lowercase();
    let separator = lowered
        .rfind('1')
        .ok_or_else(|| ScanError::Bech32("missing separator".to_string()))?;
    if separator == 0 || separator + 1 + CHECKSUM_LEN > lowered.len() {
        return Err(ScanError::Bech32("invalid separator position".to_string()));
    }

    let (hrp, rest) = lowered.split_at(separator);
    check_hrp(hrp)?;
    let mut data = Vec::with_capacity(rest.len() - 1);
    for c in rest[1..].bytes() {
        let value = CHARSET
            .iter()
            .position(|&x| x == c)
            .ok_or_else(|| ScanError::Bech32(format!("invalid character '{}'", c as char)))?;
        data.push(value as u8);
    }

    let variant = verify_checksum(hrp, &data)
        .ok_or_else(|| ScanError::Bech32("checksum mismatch".to_string()))?;
    data.truncate(data.len() - CHECKSUM_LEN);

    Ok((hrp.to_string(), data, variant))
}

pub fn encode_segwit(hrp: &str, witness_version: u8, program: &[u8]) -> Result<String> {
    if witness_version > 16 {
        return Err(ScanError::Bech32(format!("invalid witness version {}", witness_version)));
    }
    let mut data = vec![witness_version];
    data.extend(convert_bits(program, 8, 5, true)?);
    encode(hrp, &data, Variant::for_witness_version(witness_version))
}

/// Decodes a segwit address for the expected HRP into (version, program).
pub fn decode_segwit(expected_hrp: &str, address: &str) -> Result<(u8, Vec<u8>)> {
    let (hrp, data, variant) = decode(address)?;
    if hrp != expected_hrp {
        return Err(ScanError::Bech32(format!("expected hrp '{}', got '{}'", expected_hrp, hrp)));
    }
    let (&version, payload) = data
        .split_first()
        .ok_or_else(|| ScanError::Bech32("empty data part".to_string()))?;
    if version > 16 {
        return Err(ScanError::Bech32(format!("invalid witness version {}", version)));
    }
    if variant != Variant::for_witness_version(version) {
        return Err(ScanError::Bech32("checksum variant does not match witness version".to_string()));
    }

    let program = convert_bits(payload, 5, 8, false)?;
    if program.len() < 2 || program.len() > 40 {
        return Err(ScanError::Bech32(format!("invalid program length {}", program.len())));
    }
    if version == 0 && program.len() != 20 && program.len() != 32 {
        return Err(ScanError::Bech32(format!("invalid v0 program length {}", program.len())));
    }

    Ok((version, program))
}
