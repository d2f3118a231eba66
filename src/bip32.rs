//! BIP32 hierarchical deterministic keys.
//!
//! Master key generation, private and public child derivation and the
//! 78-byte extended key serialization. Version bytes are supplied by the
//! caller so the same keys can be rendered as xprv, yprv, zprv and so on.

use crate::base58;
use crate::error::{Result, ScanError};
use crate::hash::{hash160, hmac_sha512};
use once_cell::sync::Lazy;
use secp256k1::{All, PublicKey, Scalar, Secp256k1, SecretKey};
use std::fmt;
use std::str::FromStr;

static SECP: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

const MASTER_KEY_SALT: &[u8] = b"Bitcoin seed";

pub const HARDENED_OFFSET: u32 = 0x8000_0000;

pub const EXTENDED_KEY_SIZE: usize = 78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildNumber {
    Normal(u32),
    Hardened(u32),
}

impl ChildNumber {

    pub fn normal(index: u32) -> Result<Self> {
        if index >= HARDENED_OFFSET {
            return Err(ScanError::InvalidPath(format!("child index {} out of range", index)));
        }
        Ok(ChildNumber::Normal(index))
    }

    pub fn hardened(index: u32) -> Result<Self> {
        if index >= HARDENED_OFFSET {
            return Err(ScanError::InvalidPath(format!("child index {}' out of range", index)));
        }
        Ok(ChildNumber::Hardened(index))
    }

    pub fn from_u32(raw: u32) -> Self {
        if raw >= HARDENED_OFFSET {
            ChildNumber::Hardened(raw - HARDENED_OFFSET)
        } else {
            ChildNumber::Normal(raw)
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            ChildNumber::Normal(i) => i,
            ChildNumber::Hardened(i) => i + HARDENED_OFFSET,
        }
    }

    pub fn is_hardened(self) -> bool {
        matches!(self, ChildNumber::Hardened(_))
    }
}

impl fmt::Display for ChildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildNumber::Normal(i) => write!(f, "{}", i),
            ChildNumber::Hardened(i) => write!(f, "{}'", i),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DerivationPath(Vec<ChildNumber>);

impl DerivationPath {

    pub fn master() -> Self {
        DerivationPath(Vec::new())
    }

    pub fn child(&self, child: ChildNumber) -> Self {
        let mut path = self.0.clone();
        path.push(child);
        DerivationPath(path)
    }

    pub fn as_slice(&self) -> &[ChildNumber] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ChildNumber>> for DerivationPath {
    fn from(children: Vec<ChildNumber>) -> Self {
        DerivationPath(children)
    }
}

impl FromStr for DerivationPath {
    type Err = ScanError;

    fn from_str(path: &str) -> Result<Self> {
        let mut parts = path.trim().split('/');
        if parts.next() != Some("m") {
            return Err(ScanError::InvalidPath(path.to_string()));
        }

        let mut children = Vec::new();
        for part in parts {
            let (index, hardened) = match part.strip_suffix('\'').or_else(|| part.strip_suffix('h')) {
                Some(index) => (index, true),
                None => (part, false),
            };

            let index: u32 = index
                .parse()
                .map_err(|_| ScanError::InvalidPath(path.to_string()))?;

            children.push(if hardened {
                ChildNumber::hardened(index)?
            } else {
                ChildNumber::normal(index)?
            });
        }

        Ok(DerivationPath(children))
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for child in &self.0 {
            write!(f, "/{}", child)?;
        }
        Ok(())
    }
}

fn tweak_from(il: &[u8]) -> Result<Scalar> {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(il);
    Scalar::from_be_bytes(bytes)
        .map_err(|_| ScanError::DerivationError("derived tweak is not below the curve order".to_string()))
}

fn split_hmac(i: &[u8; 64]) -> ([u8; 32], [u8; 32]) {
    let mut il = [0u8; 32];
    let mut ir = [0u8; 32];
    il.copy_from_slice(&i[..32]);
    ir.copy_from_slice(&i[32..]);
    (il, ir)
}

/// Fields shared by the 78-byte serialization of both key kinds.
struct RawExtendedKey {
    version: [u8; 4],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: ChildNumber,
    chain_code: [u8; 32],
    key: [u8; 33],
}

impl RawExtendedKey {

    fn encode(&self) -> [u8; EXTENDED_KEY_SIZE] {
        let mut out = [0u8; EXTENDED_KEY_SIZE];
        out[0..4].copy_from_slice(&self.version);
        out[4] = self.depth;
        out[5..9].copy_from_slice(&self.parent_fingerprint);
        out[9..13].copy_from_slice(&self.child_number.to_u32().to_be_bytes());
        out[13..45].copy_from_slice(&self.chain_code);
        out[45..78].copy_from_slice(&self.key);
        out
    }

    fn decode(encoded: &str) -> Result<Self> {
        let data = base58::decode_check(encoded)
            .map_err(|e| ScanError::InvalidExtendedKey(e.to_string()))?;
        if data.len() != EXTENDED_KEY_SIZE {
            return Err(ScanError::InvalidExtendedKey(format!("expected 78 bytes, got {}", data.len())));
        }

        let mut raw = RawExtendedKey {
            version: [0u8; 4],
            depth: data[4],
            parent_fingerprint: [0u8; 4],
            child_number: ChildNumber::Normal(0),
            chain_code: [0u8; 32],
            key: [0u8; 33],
        };
        raw.version.copy_from_slice(&data[0..4]);
        raw.parent_fingerprint.copy_from_slice(&data[5..9]);
        let mut child = [0u8; 4];
        child.copy_from_slice(&data[9..13]);
        raw.child_number = ChildNumber::from_u32(u32::from_be_bytes(child));
        raw.chain_code.copy_from_slice(&data[13..45]);
        raw.key.copy_from_slice(&data[45..78]);
        Ok(raw)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedPrivKey {
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: ChildNumber,
    chain_code: [u8; 32],
    private_key: SecretKey,
}

impl ExtendedPrivKey {

    pub fn new_master(seed: &[u8]) -> Result<Self> {
        if seed.len() < 16 || seed.len() > 64 {
            return Err(ScanError::DerivationError(format!("seed must be 16 to 64 bytes, got {}", seed.len())));
        }

        let i = hmac_sha512(MASTER_KEY_SALT, seed);
        let (il, chain_code) = split_hmac(&i);
        let private_key = SecretKey::from_slice(&il)
            .map_err(|_| ScanError::DerivationError("master key is not a valid scalar".to_string()))?;

        Ok(ExtendedPrivKey {
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: ChildNumber::Normal(0),
            chain_code,
            private_key,
        })
    }

    pub fn derive_child(&self, child: ChildNumber) -> Result<Self> {
        let mut data = Vec::with_capacity(37);
        match child {
            ChildNumber::Hardened(_) => {
                data.push(0u8);
                data.extend_from_slice(&self.private_key.secret_bytes());
            }
            ChildNumber::Normal(_) => {
                data.extend_from_slice(&self.public_key().serialize());
            }
        }
        data.extend_from_slice(&child.to_u32().to_be_bytes());

        let i = hmac_sha512(&self.chain_code, &data);
        let (il, chain_code) = split_hmac(&i);
        let private_key = self
            .private_key
            .add_tweak(&tweak_from(&il)?)
            .map_err(|_| ScanError::DerivationError(format!("child {} yields an invalid key", child)))?;

        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| ScanError::DerivationError("maximum depth exceeded".to_string()))?;

        Ok(ExtendedPrivKey {
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: child,
            chain_code,
            private_key,
        })
    }

    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self> {
        path.as_slice()
            .iter()
            .try_fold(self.clone(), |key, &child| key.derive_child(child))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(&*SECP, &self.private_key)
    }

    pub fn fingerprint(&self) -> [u8; 4] {
        let mut fp = [0u8; 4];
        fp.copy_from_slice(&hash160(&self.public_key().serialize())[..4]);
        fp
    }

    pub fn to_public(&self) -> ExtendedPubKey {
        ExtendedPubKey {
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: self.chain_code,
            public_key: self.public_key(),
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.private_key.secret_bytes()
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_number(&self) -> ChildNumber {
        self.child_number
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    fn raw(&self, version: [u8; 4]) -> RawExtendedKey {
        let mut key = [0u8; 33];
        key[1..].copy_from_slice(&self.private_key.secret_bytes());
        RawExtendedKey {
            version,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: self.chain_code,
            key,
        }
    }

    pub fn encode(&self, version: [u8; 4]) -> [u8; EXTENDED_KEY_SIZE] {
        self.raw(version).encode()
    }

    pub fn to_base58(&self, version: [u8; 4]) -> String {
        base58::encode_check(&self.encode(version))
    }

    /// Parses a Base58Check extended private key, returning its version bytes.
    pub fn from_base58(encoded: &str) -> Result<([u8; 4], Self)> {
        let raw = RawExtendedKey::decode(encoded)?;
        if raw.key[0] != 0 {
            return Err(ScanError::InvalidExtendedKey("private key must be prefixed by 0x00".to_string()));
        }
        let private_key = SecretKey::from_slice(&raw.key[1..])
            .map_err(|e| ScanError::InvalidExtendedKey(e.to_string()))?;

        Ok((
            raw.version,
            ExtendedPrivKey {
                depth: raw.depth,
                parent_fingerprint: raw.parent_fingerprint,
                child_number: raw.child_number,
                chain_code: raw.chain_code,
                private_key,
            },
        ))
    }
}

impl fmt::Debug for ExtendedPrivKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPrivKey")
            .field("depth", &self.depth)
            .field("parent_fingerprint", &hex::encode(self.parent_fingerprint))
            .field("child_number", &self.child_number)
            .field("private_key", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPubKey {
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: ChildNumber,
    chain_code: [u8; 32],
    public_key: PublicKey,
}

impl ExtendedPubKey {

    /// Normal (non-hardened) child derivation from the public key alone.
    pub fn derive_child(&self, child: ChildNumber) -> Result<Self> {
        if child.is_hardened() {
            return Err(ScanError::DerivationError(format!(
                "cannot derive hardened child {} from a public key",
                child
            )));
        }

        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&self.public_key.serialize());
        data.extend_from_slice(&child.to_u32().to_be_bytes());

        let i = hmac_sha512(&self.chain_code, &data);
        let (il, chain_code) = split_hmac(&i);
        let public_key = self
            .public_key
            .add_exp_tweak(&*SECP, &tweak_from(&il)?)
            .map_err(|_| ScanError::DerivationError(format!("child {} yields an invalid key", child)))?;

        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| ScanError::DerivationError("maximum depth exceeded".to_string()))?;

        Ok(ExtendedPubKey {
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: child,
            chain_code,
            public_key,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn fingerprint(&self) -> [u8; 4] {
        let mut fp = [0u8; 4];
        fp.copy_from_slice(&hash160(&self.public_key.serialize())[..4]);
        fp
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    fn raw(&self, version: [u8; 4]) -> RawExtendedKey {
        RawExtendedKey {
            version,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: self.chain_code,
            key: self.public_key.serialize(),
        }
    }

    pub fn encode(&self, version: [u8; 4]) -> [u8; EXTENDED_KEY_SIZE] {
        self.raw(version).encode()
    }

    pub fn to_base58(&self, version: [u8; 4]) -> String {
        base58::encode_check(&self.encode(version))
    }

    pub fn from_base58(encoded: &str) -> Result<([u8; 4], Self)> {
        let raw = RawExtendedKey::decode(encoded)?;
        let public_key = PublicKey::from_slice(&raw.key)
            .map_err(|e| ScanError::InvalidExtendedKey(e.to_string()))?;

        Ok((
            raw.version,
            ExtendedPubKey {
                depth: raw.depth,
                parent_fingerprint: raw.parent_fingerprint,
                child_number: raw.child_number,
                chain_code: raw.chain_code,
                public_key,
            },
        ))
    }
}
