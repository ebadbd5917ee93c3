use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::crypto::{sha3_hash, SignatureType};

pub const GENESIS_SENTINEL: &str = "GENESIS";
pub const MINING_REWARD_SENTINEL: &str = "MINING_REWARD";

/// Hex characters after the prefix (20 bytes of SHA3-256)
pub const ADDRESS_BODY_LEN: usize = 40;
/// Prefix + body = 42 chars total
pub const ADDRESS_LEN: usize = 2 + ADDRESS_BODY_LEN;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Unknown address prefix: {0}")]
    UnknownPrefix(String),
    #[error("Address must be 42 characters, got {0}")]
    InvalidLength(usize),
    #[error("Address body must be lowercase hex")]
    InvalidBody,
}

/// Which signature family controls an account address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    Classical,
    Falcon,
    Dilithium,
}

impl AddressKind {
    pub const ALL: [AddressKind; 3] = [AddressKind::Classical, AddressKind::Falcon, AddressKind::Dilithium];

    pub fn prefix(&self) -> &'static str {
        match self {
            AddressKind::Classical => "0x",
            AddressKind::Falcon => "qx",
            AddressKind::Dilithium => "lx",
        }
    }

    pub fn signature_type(&self) -> SignatureType {
        match self {
            AddressKind::Classical => SignatureType::Classical,
            AddressKind::Falcon => SignatureType::Falcon,
            AddressKind::Dilithium => SignatureType::Dilithium,
        }
    }

    pub fn for_signature_type(signature_type: SignatureType) -> Option<Self> {
        match signature_type {
            SignatureType::Classical => Some(AddressKind::Classical),
            SignatureType::Falcon => Some(AddressKind::Falcon),
            SignatureType::Dilithium => Some(AddressKind::Dilithium),
            SignatureType::System => None,
        }
    }

    pub fn is_post_quantum(&self) -> bool {
        !matches!(self, AddressKind::Classical)
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        AddressKind::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

/// Ledger address. Sentinels denote system-issued value; accounts carry their
/// signature family explicitly, fixed when the address is derived.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Address {
    Genesis,
    MiningReward,
    Account { kind: AddressKind, body: String },
}

impl Address {
    /// Derive an account address from a public key
    /// Uses first 20 bytes of SHA3-256 hash: prefix + 40 hex chars = 42 chars total
    pub fn from_public_key(kind: AddressKind, public_key: &[u8]) -> Self {
        let hash = sha3_hash(public_key);
        Address::Account {
            kind,
            body: hex::encode(&hash[..20]),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Address::Genesis | Address::MiningReward)
    }

    pub fn kind(&self) -> Option<AddressKind> {
        match self {
            Address::Account { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Re-check an account built by hand rather than parsed or derived.
    pub fn validate(&self) -> Result<(), AddressError> {
        self.to_string().parse::<Address>().map(|_| ())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Genesis => f.write_str(GENESIS_SENTINEL),
            Address::MiningReward => f.write_str(MINING_REWARD_SENTINEL),
            Address::Account { kind, body } => write!(f, "{}{}", kind.prefix(), body),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            GENESIS_SENTINEL => return Ok(Address::Genesis),
            MINING_REWARD_SENTINEL => return Ok(Address::MiningReward),
            _ => {}
        }

        let prefix = s.get(..2).unwrap_or(s);
        let kind = AddressKind::from_prefix(prefix).ok_or_else(|| AddressError::UnknownPrefix(prefix.to_string()))?;
        if s.len() != ADDRESS_LEN {
            return Err(AddressError::InvalidLength(s.len()));
        }

        let body = &s[2..];
        if !body.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(AddressError::InvalidBody);
        }

        Ok(Address::Account {
            kind,
            body: body.to_string(),
        })
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(c: char) -> String {
        std::iter::repeat(c).take(ADDRESS_BODY_LEN).collect()
    }

    #[test]
    fn test_parse_each_kind() {
        for kind in AddressKind::ALL {
            let raw = format!("{}{}", kind.prefix(), body('a'));
            let address: Address = raw.parse().unwrap();
            assert_eq!(address.kind(), Some(kind));
            assert_eq!(address.to_string(), raw);
        }
    }

    #[test]
    fn test_sentinels() {
        assert_eq!("GENESIS".parse::<Address>(), Ok(Address::Genesis));
        assert_eq!("MINING_REWARD".parse::<Address>(), Ok(Address::MiningReward));
        assert!(Address::Genesis.is_system());
        assert_eq!(Address::MiningReward.kind(), None);
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(
            "zx".to_string().parse::<Address>(),
            Err(AddressError::UnknownPrefix("zx".into()))
        );
        assert_eq!("qxabc".parse::<Address>(), Err(AddressError::InvalidLength(5)));
        let upper = format!("qx{}", body('A'));
        assert_eq!(upper.parse::<Address>(), Err(AddressError::InvalidBody));
        assert!("".parse::<Address>().is_err());

        let hand_built = Address::Account {
            kind: AddressKind::Falcon,
            body: "abc".into(),
        };
        assert_eq!(hand_built.validate(), Err(AddressError::InvalidLength(5)));
    }

    #[test]
    fn test_derived_address_shape() {
        let address = Address::from_public_key(AddressKind::Dilithium, b"public key bytes");
        let rendered = address.to_string();
        assert_eq!(rendered.len(), ADDRESS_LEN);
        assert!(rendered.starts_with("lx"));
        assert_eq!(rendered.parse::<Address>().unwrap(), address);
    }

    #[test]
    fn test_serde_as_string() {
        let address: Address = format!("0x{}", body('1')).parse().unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"0x{}\"", body('1')));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
        assert!(serde_json::from_str::<Address>("\"nope\"").is_err());
    }
}
