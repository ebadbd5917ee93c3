use pqcrypto_falcon::falcon512;
use pqcrypto_traits::sign::{PublicKey as _, SecretKey as _, SignedMessage as _};

use super::signatures::{KeyMaterial, SignatureError, SignatureScheme, SignatureType};

/// Falcon-512 signing capability
/// Public key: ~897 bytes, Secret key: ~1281 bytes, Signed message: ~666 bytes + message
///
/// Signatures are Falcon signed messages; verification opens them and compares the
/// recovered payload with the expected message.
#[derive(Clone, Copy, Debug, Default)]
pub struct FalconScheme;

impl SignatureScheme for FalconScheme {
    fn signature_type(&self) -> SignatureType {
        SignatureType::Falcon
    }

    fn generate_keypair(&self) -> KeyMaterial {
        let (pk, sk) = falcon512::keypair();
        KeyMaterial::new(
            SignatureType::Falcon,
            pk.as_bytes().to_vec(),
            sk.as_bytes().to_vec(),
        )
    }

    fn sign(&self, message: &[u8], secret_key: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let sk = falcon512::SecretKey::from_bytes(secret_key)
            .map_err(|_| SignatureError::MalformedSecretKey(SignatureType::Falcon))?;
        let signed = falcon512::sign(message, &sk);
        Ok(signed.as_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(pk) = falcon512::PublicKey::from_bytes(public_key) else {
            return false;
        };
        let Ok(sm) = falcon512::SignedMessage::from_bytes(signature) else {
            return false;
        };
        match falcon512::open(&sm, &pk) {
            Ok(verified_msg) => verified_msg == message,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let keys = FalconScheme.generate_keypair();
        assert!(keys.public_key.len() > 800); // ~897 bytes
        assert!(keys.secret_key().len() > 1200); // ~1281 bytes
    }

    #[test]
    fn test_signature_verification() {
        let keys = FalconScheme.generate_keypair();
        let message = b"post-quantum transfer";
        let signature = FalconScheme.sign(message, keys.secret_key()).unwrap();

        assert!(FalconScheme.verify(message, &signature, &keys.public_key));
        assert!(!FalconScheme.verify(b"another transfer", &signature, &keys.public_key));
    }

    #[test]
    fn test_rejects_foreign_key() {
        let alice = FalconScheme.generate_keypair();
        let mallory = FalconScheme.generate_keypair();
        let signature = FalconScheme.sign(b"payload", alice.secret_key()).unwrap();
        assert!(!FalconScheme.verify(b"payload", &signature, &mallory.public_key));
    }

    #[test]
    fn test_malformed_secret_key() {
        let err = FalconScheme.sign(b"payload", &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, SignatureError::MalformedSecretKey(SignatureType::Falcon)));
    }
}
