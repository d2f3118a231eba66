use crate::{
    address::Address,
    bip32::{ChildNumber, DerivationPath, ExtendedPrivKey},
    error::{Result, ScanError},
    mnemonic::Mnemonic,
    seed::Seed,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Bitcoin,
    Testnet,
}

impl Network {

    /// BIP44 coin type: 0 for mainnet, 1 for every test network.
    pub fn coin_type(self) -> u32 {
        match self {
            Network::Bitcoin => 0,
            Network::Testnet => 1,
        }
    }

    pub fn p2pkh_version(self) -> u8 {
        match self {
            Network::Bitcoin => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    pub fn p2sh_version(self) -> u8 {
        match self {
            Network::Bitcoin => 0x05,
            Network::Testnet => 0xc4,
        }
    }

    pub fn hrp(self) -> &'static str {
        match self {
            Network::Bitcoin => "bc",
            Network::Testnet => "tb",
        }
    }
}

impl FromStr for Network {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bitcoin" | "mainnet" | "main" => Ok(Network::Bitcoin),
            "testnet" | "test" => Ok(Network::Testnet),
            other => Err(ScanError::Config(format!("unknown network '{}'", other))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Bitcoin => write!(f, "bitcoin"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

/// Version bytes for the extended keys of one scheme on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyVersions {
    pub private: [u8; 4],
    pub public: [u8; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Legacy P2PKH.
    Bip44,
    /// P2WPKH nested in P2SH.
    Bip49,
    /// Native segwit P2WPKH.
    Bip84,
}

impl Scheme {

    pub const ALL: [Scheme; 3] = [Scheme::Bip44, Scheme::Bip49, Scheme::Bip84];

    pub fn purpose(self) -> u32 {
        match self {
            Scheme::Bip44 => 44,
            Scheme::Bip49 => 49,
            Scheme::Bip84 => 84,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Scheme::Bip44 => "bip44",
            Scheme::Bip49 => "bip49",
            Scheme::Bip84 => "bip84",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Scheme::Bip44 => "Legacy (P2PKH)",
            Scheme::Bip49 => "Nested SegWit (P2SH-P2WPKH)",
            Scheme::Bip84 => "Native SegWit (P2WPKH)",
        }
    }

    /// SLIP-132 version bytes (xprv/yprv/zprv and their testnet forms).
    pub fn key_versions(self, network: Network) -> KeyVersions {
        let (private, public) = match (self, network) {
            (Scheme::Bip44, Network::Bitcoin) => (0x0488ADE4u32, 0x0488B21Eu32),
            (Scheme::Bip49, Network::Bitcoin) => (0x049D7878, 0x049D7CB2),
            (Scheme::Bip84, Network::Bitcoin) => (0x04B2430C, 0x04B24746),
            (Scheme::Bip44, Network::Testnet) => (0x04358394, 0x043587CF),
            (Scheme::Bip49, Network::Testnet) => (0x044A4E28, 0x044A5262),
            (Scheme::Bip84, Network::Testnet) => (0x045F18BC, 0x045F1CF6),
        };
        KeyVersions {
            private: private.to_be_bytes(),
            public: public.to_be_bytes(),
        }
    }

    /// Parses a comma separated list such as `bip44,bip84`.
    pub fn parse_list(list: &str) -> Result<Vec<Scheme>> {
        let mut schemes = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let scheme: Scheme = part.parse()?;
            if !schemes.contains(&scheme) {
                schemes.push(scheme);
            }
        }
        if schemes.is_empty() {
            return Err(ScanError::Config("no derivation schemes given".to_string()));
        }
        Ok(schemes)
    }
}

impl FromStr for Scheme {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bip44" | "44" | "p2pkh" | "legacy" => Ok(Scheme::Bip44),
            "bip49" | "49" | "p2sh-p2wpkh" | "p2sh" => Ok(Scheme::Bip49),
            "bip84" | "84" | "p2wpkh" | "segwit" => Ok(Scheme::Bip84),
            other => Err(ScanError::Config(format!("unknown derivation scheme '{}'", other))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HDPath {

    pub scheme: Scheme,

    pub coin: u32,

    pub account: u32,

    /// 0 for receive addresses, 1 for change.
    pub change: u32,

    pub index: u32,
}

impl HDPath {

    /// First receive address of account 0.
    pub fn new(scheme: Scheme, network: Network) -> Self {
        HDPath {
            scheme,
            coin: network.coin_type(),
            account: 0,
            change: 0,
            index: 0,
        }
    }

    pub fn with_account(mut self, account: u32) -> Self {
        self.account = account;
        self
    }

    pub fn with_change(mut self, change: u32) -> Self {
        self.change = change;
        self
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// m/purpose'/coin'/account'
    pub fn account_path(&self) -> Result<DerivationPath> {
        Ok(DerivationPath::from(vec![
            ChildNumber::hardened(self.scheme.purpose())?,
            ChildNumber::hardened(self.coin)?,
            ChildNumber::hardened(self.account)?,
        ]))
    }

    pub fn to_derivation_path(&self) -> Result<DerivationPath> {
        Ok(self
            .account_path()?
            .child(ChildNumber::normal(self.change)?)
            .child(ChildNumber::normal(self.index)?))
    }
}

impl fmt::Display for HDPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m/{}'/{}'/{}'/{}/{}",
            self.scheme.purpose(),
            self.coin,
            self.account,
            self.change,
            self.index
        )
    }
}

/// One derived address together with the account-level extended keys it
/// was derived under.
#[derive(Clone)]
pub struct DerivedAddress {
    pub path: HDPath,
    pub xprv: String,
    pub xpub: String,
    pub address: Address,
}

impl fmt::Debug for DerivedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedAddress")
            .field("path", &self.path.to_string())
            .field("xpub", &self.xpub)
            .field("xprv", &"<REDACTED>")
            .field("address", &self.address.as_str())
            .finish()
    }
}

pub struct Wallet {
    network: Network,
    master_key: ExtendedPrivKey,
}

impl Wallet {

    pub fn from_seed(seed: &Seed, network: Network) -> Result<Self> {
        let master_key = ExtendedPrivKey::new_master(seed.as_bytes())?;

        Ok(Wallet {
            network,
            master_key,
        })
    }

    pub fn from_mnemonic(mnemonic: &Mnemonic, passphrase: &str, network: Network) -> Result<Self> {
        Self::from_seed(&mnemonic.to_seed(passphrase), network)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn derive_account(&self, path: &HDPath) -> Result<ExtendedPrivKey> {
        self.master_key.derive_path(&path.account_path()?)
    }

    pub fn derive_address(&self, path: &HDPath) -> Result<DerivedAddress> {
        let account = self.derive_account(path)?;
        let leaf = account
            .derive_child(ChildNumber::normal(path.change)?)?
            .derive_child(ChildNumber::normal(path.index)?)?;

        let address = Address::from_public_key(&leaf.public_key(), path.scheme, self.network)?;
        let versions = path.scheme.key_versions(self.network);

        Ok(DerivedAddress {
            path: *path,
            xprv: account.to_base58(versions.private),
            xpub: account.to_public().to_base58(versions.public),
            address,
        })
    }

    /// First receive address of account 0 for each scheme, in order.
    pub fn derive_all(&self, schemes: &[Scheme]) -> Result<Vec<DerivedAddress>> {
        schemes
            .iter()
            .map(|&scheme| self.derive_address(&HDPath::new(scheme, self.network)))
            .collect()
    }

    pub fn generate_addresses(&self, scheme: Scheme, account: u32, count: u32) -> Result<Vec<Address>> {
        let account_key = self.derive_account(&HDPath::new(scheme, self.network).with_account(account))?;
        let external = account_key.derive_child(ChildNumber::Normal(0))?.to_public();

        (0..count)
            .map(|i| {
                let leaf = external.derive_child(ChildNumber::normal(i)?)?;
                Address::from_public_key(&leaf.public_key(), scheme, self.network)
            })
            .collect()
    }
}
