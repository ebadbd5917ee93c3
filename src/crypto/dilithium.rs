use pqcrypto_dilithium::dilithium3;
use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _, SecretKey as _};

use super::signatures::{KeyMaterial, SignatureError, SignatureScheme, SignatureType};

/// Dilithium3 (ML-DSA) signing capability using detached signatures.
#[derive(Clone, Copy, Debug, Default)]
pub struct DilithiumScheme;

impl SignatureScheme for DilithiumScheme {
    fn signature_type(&self) -> SignatureType {
        SignatureType::Dilithium
    }

    fn generate_keypair(&self) -> KeyMaterial {
        let (pk, sk) = dilithium3::keypair();
        KeyMaterial::new(
            SignatureType::Dilithium,
            pk.as_bytes().to_vec(),
            sk.as_bytes().to_vec(),
        )
    }

    fn sign(&self, message: &[u8], secret_key: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let sk = dilithium3::SecretKey::from_bytes(secret_key)
            .map_err(|_| SignatureError::MalformedSecretKey(SignatureType::Dilithium))?;
        Ok(dilithium3::detached_sign(message, &sk).as_bytes().to_vec())
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(pk) = dilithium3::PublicKey::from_bytes(public_key) else {
            return false;
        };
        let Ok(sig) = dilithium3::DetachedSignature::from_bytes(signature) else {
            return false;
        };
        dilithium3::verify_detached_signature(&sig, message, &pk).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keys = DilithiumScheme.generate_keypair();
        let signature = DilithiumScheme.sign(b"lattice", keys.secret_key()).unwrap();
        assert!(DilithiumScheme.verify(b"lattice", &signature, &keys.public_key));
        assert!(!DilithiumScheme.verify(b"lattices", &signature, &keys.public_key));
    }

    #[test]
    fn test_garbage_signature() {
        let keys = DilithiumScheme.generate_keypair();
        assert!(!DilithiumScheme.verify(b"lattice", &[0u8; 16], &keys.public_key));
    }
}
