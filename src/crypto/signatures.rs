use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroize;

use super::dilithium::DilithiumScheme;
use super::ecdsa::EcdsaScheme;
use super::falcon::FalconScheme;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Malformed secret key for {0}")]
    MalformedSecretKey(SignatureType),
    #[error("No signing capability registered for {0}")]
    UnsupportedScheme(SignatureType),
}

/// Tag recorded on every transaction naming the capability that signed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureType {
    /// Genesis and mining reward transactions; never signed.
    System,
    /// ECDSA over secp256k1
    Classical,
    /// Falcon-512
    Falcon,
    /// Dilithium3
    Dilithium,
}

impl SignatureType {
    pub const ALL: [SignatureType; 4] = [
        SignatureType::System,
        SignatureType::Classical,
        SignatureType::Falcon,
        SignatureType::Dilithium,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureType::System => "system",
            SignatureType::Classical => "classical",
            SignatureType::Falcon => "falcon",
            SignatureType::Dilithium => "dilithium",
        }
    }

    pub fn is_post_quantum(&self) -> bool {
        matches!(self, SignatureType::Falcon | SignatureType::Dilithium)
    }

    /// Stable single-byte tag used when hashing transactions.
    pub(crate) fn wire_tag(&self) -> u8 {
        match self {
            SignatureType::System => 0,
            SignatureType::Classical => 1,
            SignatureType::Falcon => 2,
            SignatureType::Dilithium => 3,
        }
    }
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignatureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classical" | "ecdsa" => Ok(SignatureType::Classical),
            "falcon" => Ok(SignatureType::Falcon),
            "dilithium" => Ok(SignatureType::Dilithium),
            "system" => Ok(SignatureType::System),
            other => Err(format!("unknown signature type: {}", other)),
        }
    }
}

/// Freshly generated key pair. The secret half is wiped on drop.
#[derive(Clone)]
pub struct KeyMaterial {
    pub signature_type: SignatureType,
    pub public_key: Vec<u8>,
    secret_key: Vec<u8>,
}

impl KeyMaterial {
    pub(crate) fn new(signature_type: SignatureType, public_key: Vec<u8>, secret_key: Vec<u8>) -> Self {
        Self {
            signature_type,
            public_key,
            secret_key,
        }
    }

    pub fn secret_key(&self) -> &[u8] {
        &self.secret_key
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("signature_type", &self.signature_type)
            .field("public_key_len", &self.public_key.len())
            .finish_non_exhaustive()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

/// A sign/verify capability. The ledger only ever sees these two operations and
/// the tag; the math behind them belongs to the implementation.
pub trait SignatureScheme: Send + Sync {
    fn signature_type(&self) -> SignatureType;

    fn generate_keypair(&self) -> KeyMaterial;

    fn sign(&self, message: &[u8], secret_key: &[u8]) -> Result<Vec<u8>, SignatureError>;

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool;
}

/// Signing capabilities indexed by the tag they produce.
#[derive(Clone, Default)]
pub struct SchemeRegistry {
    schemes: HashMap<SignatureType, Arc<dyn SignatureScheme>>,
}

impl SchemeRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the classical, Falcon and Dilithium capabilities.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(EcdsaScheme::new()));
        registry.register(Arc::new(FalconScheme));
        registry.register(Arc::new(DilithiumScheme));
        registry
    }

    /// Register a capability, replacing any previous one with the same tag.
    pub fn register(&mut self, scheme: Arc<dyn SignatureScheme>) {
        self.schemes.insert(scheme.signature_type(), scheme);
    }

    pub fn get(&self, signature_type: SignatureType) -> Result<&Arc<dyn SignatureScheme>, SignatureError> {
        self.schemes
            .get(&signature_type)
            .ok_or(SignatureError::UnsupportedScheme(signature_type))
    }

    pub fn supports(&self, signature_type: SignatureType) -> bool {
        self.schemes.contains_key(&signature_type)
    }
}

impl fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.schemes.keys().collect();
        tags.sort();
        f.debug_struct("SchemeRegistry").field("schemes", &tags).finish()
    }
}

/// Calculate SHA3-256 hash
/// Returns exactly 32 bytes for type safety
pub fn sha3_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// SHA3-256 rendered as 64 lowercase hex characters
pub fn sha3_hex(data: &[u8]) -> String {
    hex::encode(sha3_hash(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha3_hex_is_stable() {
        let a = sha3_hex(b"ledger");
        let b = sha3_hex(b"ledger");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, sha3_hex(b"ledger!"));
    }

    #[test]
    fn test_default_registry_covers_account_schemes() {
        let registry = SchemeRegistry::with_defaults();
        assert!(registry.supports(SignatureType::Classical));
        assert!(registry.supports(SignatureType::Falcon));
        assert!(registry.supports(SignatureType::Dilithium));
        assert!(!registry.supports(SignatureType::System));
        assert!(matches!(
            registry.get(SignatureType::System),
            Err(SignatureError::UnsupportedScheme(SignatureType::System))
        ));
    }

    #[test]
    fn test_signature_type_parsing() {
        assert_eq!("falcon".parse::<SignatureType>(), Ok(SignatureType::Falcon));
        assert_eq!("ECDSA".parse::<SignatureType>(), Ok(SignatureType::Classical));
        assert!("rsa".parse::<SignatureType>().is_err());
    }
}
