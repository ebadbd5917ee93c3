use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};

use super::signatures::{sha3_hash, KeyMaterial, SignatureError, SignatureScheme, SignatureType};

/// Classical ECDSA over secp256k1. Messages are SHA3-256 digested before signing;
/// signatures are 64-byte compact encodings and public keys are 33-byte compressed.
pub struct EcdsaScheme {
    secp: Secp256k1<All>,
}

impl EcdsaScheme {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }
}

impl Default for EcdsaScheme {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureScheme for EcdsaScheme {
    fn signature_type(&self) -> SignatureType {
        SignatureType::Classical
    }

    fn generate_keypair(&self) -> KeyMaterial {
        let (sk, pk) = self.secp.generate_keypair(&mut rand::thread_rng());
        KeyMaterial::new(
            SignatureType::Classical,
            pk.serialize().to_vec(),
            sk.secret_bytes().to_vec(),
        )
    }

    fn sign(&self, message: &[u8], secret_key: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let sk = SecretKey::from_slice(secret_key)
            .map_err(|_| SignatureError::MalformedSecretKey(SignatureType::Classical))?;
        let msg = Message::from_digest(sha3_hash(message));
        Ok(self.secp.sign_ecdsa(&msg, &sk).serialize_compact().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(pk) = PublicKey::from_slice(public_key) else {
            return false;
        };
        let Ok(sig) = Signature::from_compact(signature) else {
            return false;
        };
        let msg = Message::from_digest(sha3_hash(message));
        self.secp.verify_ecdsa(&msg, &sig, &pk).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let scheme = EcdsaScheme::new();
        let keys = scheme.generate_keypair();
        assert_eq!(keys.public_key.len(), 33);
        assert_eq!(keys.secret_key().len(), 32);

        let signature = scheme.sign(b"classical", keys.secret_key()).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(scheme.verify(b"classical", &signature, &keys.public_key));
        assert!(!scheme.verify(b"classicaL", &signature, &keys.public_key));
    }

    #[test]
    fn test_rejects_zero_secret_key() {
        let scheme = EcdsaScheme::new();
        assert!(scheme.sign(b"msg", &[0u8; 32]).is_err());
    }
}
