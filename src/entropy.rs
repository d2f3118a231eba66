use crate::error::{Result, ScanError};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};
use std::fmt;

/// Bits of entropy behind a 12-word mnemonic.
pub const ENTROPY_BITS: usize = 128;

pub const ENTROPY_BYTES: usize = ENTROPY_BITS / 8;

/// Checksum bits appended before word encoding (ENT / 32).
pub const CHECKSUM_BITS: usize = ENTROPY_BITS / 32;

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Entropy {
    data: [u8; ENTROPY_BYTES],
}

impl Entropy {

    /// Fresh entropy from the operating system CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut data = [0u8; ENTROPY_BYTES];
        rand::rngs::OsRng
            .try_fill_bytes(&mut data)
            .map_err(|e| ScanError::RandomError(e.to_string()))?;

        Ok(Entropy { data })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let data: [u8; ENTROPY_BYTES] = bytes
            .try_into()
            .map_err(|_| ScanError::InvalidEntropySize(bytes.len()))?;
        Ok(Entropy { data })
    }

    pub fn from_hex(hex: &str) -> Result<Self> {
        let bytes = hex::decode(hex)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.data)
    }

    /// Top [`CHECKSUM_BITS`] bits of SHA-256(entropy), right-aligned.
    pub fn checksum(&self) -> u8 {
        let hash = Sha256::digest(self.data);
        hash[0] >> (8 - CHECKSUM_BITS)
    }

    /// The 132-bit stream (entropy followed by checksum) split into twelve
    /// 11-bit word indices.
    pub fn word_indices(&self) -> [u16; 12] {
        let mut bits = Vec::with_capacity(ENTROPY_BITS + CHECKSUM_BITS);
        for byte in &self.data {
            for i in (0..8).rev() {
                bits.push((byte >> i) & 1 == 1);
            }
        }
        let checksum = self.checksum();
        for i in (0..CHECKSUM_BITS).rev() {
            bits.push((checksum >> i) & 1 == 1);
        }

        let mut indices = [0u16; 12];
        for (slot, chunk) in indices.iter_mut().zip(bits.chunks(11)) {
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    *slot |= 1 << (10 - i);
                }
            }
        }
        indices
    }
}

impl fmt::Debug for Entropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entropy")
            .field("bits", &ENTROPY_BITS)
            .field("data", &"<REDACTED>")
            .finish()
    }
}
