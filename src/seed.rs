use crate::hash::pbkdf2_hmac_sha512;
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, ZeroizeOnDrop};
use std::fmt;

const PBKDF2_ROUNDS: u32 = 2048;

pub const SEED_SIZE: usize = 64;

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    data: [u8; SEED_SIZE],
}

impl Seed {

    pub fn from_mnemonic(mnemonic: &str, passphrase: &str) -> Self {

        let normalized_mnemonic = mnemonic.nfkd().collect::<String>();
        let normalized_passphrase = passphrase.nfkd().collect::<String>();

        let password = normalized_mnemonic.as_bytes();
        let salt = format!("mnemonic{}", normalized_passphrase);

        let mut seed_data = [0u8; SEED_SIZE];
        pbkdf2_hmac_sha512(password, salt.as_bytes(), PBKDF2_ROUNDS, &mut seed_data);

        Seed { data: seed_data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.data)
    }

    pub fn from_bytes(bytes: [u8; SEED_SIZE]) -> Self {
        Seed { data: bytes }
    }

    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        if bytes.len() != SEED_SIZE {
            return Err(hex::FromHexError::InvalidStringLength);
        }

        let mut data = [0u8; SEED_SIZE];
        data.copy_from_slice(&bytes);
        Ok(Seed { data })
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("data", &"<REDACTED>").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_trezor_vector() {
        let seed = Seed::from_mnemonic(PHRASE, "TREZOR");
        assert_eq!(
            seed.to_hex(),
            "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e5349553\
             1f09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04"
        );
    }

    #[test]
    fn test_empty_passphrase_matches_reference() {
        use hmac::Hmac;
        use sha2::Sha512;

        let seed = Seed::from_mnemonic(PHRASE, "");
        let mut reference = [0u8; SEED_SIZE];
        pbkdf2::pbkdf2::<Hmac<Sha512>>(PHRASE.as_bytes(), b"mnemonic", 2048, &mut reference).unwrap();
        assert_eq!(seed.as_bytes(), &reference[..]);
    }

    #[test]
    fn test_passphrase_changes_seed() {
        assert_ne!(Seed::from_mnemonic(PHRASE, ""), Seed::from_mnemonic(PHRASE, "x"));
    }

    #[test]
    fn test_hex_roundtrip() {
        let seed = Seed::from_mnemonic(PHRASE, "");
        assert_eq!(Seed::from_hex(&seed.to_hex()).unwrap(), seed);
        assert!(Seed::from_hex("00ff").is_err());
    }
}
