use crate::{
    base58, bech32,
    error::{Result, ScanError},
    hash::hash160,
    wallet::{Network, Scheme},
};
use secp256k1::PublicKey;
use std::fmt;

/// Witness version 0 program push: OP_0 followed by a 20-byte push.
fn p2wpkh_script(key_hash: &[u8; 20]) -> [u8; 22] {
    let mut script = [0u8; 22];
    script[0] = 0x00;
    script[1] = 0x14;
    script[2..].copy_from_slice(key_hash);
    script
}

/// A receive address for one of the supported schemes.
///
/// `hash` is the 20-byte payload that is actually encoded: the public key
/// hash for BIP44 and BIP84, the redeem script hash for BIP49.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    scheme: Scheme,
    network: Network,
    hash: [u8; 20],
    encoded: String,
}

impl Address {

    pub fn from_public_key(public_key: &PublicKey, scheme: Scheme, network: Network) -> Result<Self> {
        let key_hash = hash160(&public_key.serialize());
        let hash = match scheme {
            Scheme::Bip49 => hash160(&p2wpkh_script(&key_hash)),
            Scheme::Bip44 | Scheme::Bip84 => key_hash,
        };
        Self::from_hash(scheme, network, hash)
    }

    pub fn from_hash(scheme: Scheme, network: Network, hash: [u8; 20]) -> Result<Self> {
        let encoded = match scheme {
            Scheme::Bip44 => Self::encode_base58(network.p2pkh_version(), &hash),
            Scheme::Bip49 => Self::encode_base58(network.p2sh_version(), &hash),
            Scheme::Bip84 => bech32::encode_segwit(network.hrp(), 0, &hash)?,
        };

        Ok(Address {
            scheme,
            network,
            hash,
            encoded,
        })
    }

    fn encode_base58(version: u8, hash: &[u8; 20]) -> String {
        let mut payload = Vec::with_capacity(21);
        payload.push(version);
        payload.extend_from_slice(hash);
        base58::encode_check(&payload)
    }

    /// Decodes an address string produced for `network`.
    pub fn parse(input: &str, network: Network) -> Result<Self> {
        let input = input.trim();
        let segwit_prefix = format!("{}1", network.hrp());

        let (scheme, hash) = if input.to_lowercase().starts_with(&segwit_prefix) {
            let (version, program) = bech32::decode_segwit(network.hrp(), input)
                .map_err(|e| ScanError::InvalidAddress(format!("{}: {}", input, e)))?;
            if version != 0 || program.len() != 20 {
                return Err(ScanError::InvalidAddress(format!("{}: not a P2WPKH address", input)));
            }
            (Scheme::Bip84, Self::hash_from(&program))
        } else {
            let payload = base58::decode_check(input)
                .map_err(|e| ScanError::InvalidAddress(format!("{}: {}", input, e)))?;
            if payload.len() != 21 {
                return Err(ScanError::InvalidAddress(format!("{}: bad payload length {}", input, payload.len())));
            }

            let scheme = match payload[0] {
                v if v == network.p2pkh_version() => Scheme::Bip44,
                v if v == network.p2sh_version() => Scheme::Bip49,
                v => {
                    return Err(ScanError::InvalidAddress(format!(
                        "{}: version byte 0x{:02x} is not valid on {}",
                        input, v, network
                    )))
                }
            };
            (scheme, Self::hash_from(&payload[1..]))
        };

        Self::from_hash(scheme, network, hash)
    }

    fn hash_from(bytes: &[u8]) -> [u8; 20] {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(bytes);
        hash
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}
