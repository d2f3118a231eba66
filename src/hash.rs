//! Hash primitives shared by seed derivation, BIP32 and address encoding.

use hmac::{Hmac, Mac};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256(SHA-256(data)), the Base58Check checksum hash.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// RIPEMD-160(SHA-256(data)), used for public key and script hashes.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

fn keyed_sha512(key: &[u8]) -> HmacSha512 {
    // HMAC accepts keys of any length
    HmacSha512::new_from_slice(key).expect("HMAC-SHA512 accepts any key length")
}

fn finalize64(mac: HmacSha512) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

pub fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = keyed_sha512(key);
    mac.update(data);
    finalize64(mac)
}

/// PBKDF2 with HMAC-SHA512 as the PRF (RFC 8018 section 5.2).
///
/// Fills `output` completely; its length decides how many 64-byte blocks
/// are computed.
pub fn pbkdf2_hmac_sha512(password: &[u8], salt: &[u8], rounds: u32, output: &mut [u8]) {
    let prf = keyed_sha512(password);

    for (block_index, chunk) in output.chunks_mut(64).enumerate() {
        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&(block_index as u32 + 1).to_be_bytes());
        let mut u = finalize64(mac);
        let mut t = u;

        for _ in 1..rounds {
            let mut mac = prf.clone();
            mac.update(&u);
            u = finalize64(mac);
            for (acc, byte) in t.iter_mut().zip(u.iter()) {
                *acc ^= byte;
            }
        }

        chunk.copy_from_slice(&t[..chunk.len()]);
    }
}
