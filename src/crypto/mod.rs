pub mod signatures;
pub mod ecdsa;
pub mod falcon;
pub mod dilithium;

pub use signatures::{
    sha3_hash, sha3_hex, KeyMaterial, SchemeRegistry, SignatureError, SignatureScheme, SignatureType,
};
pub use ecdsa::EcdsaScheme;
pub use falcon::FalconScheme;
pub use dilithium::DilithiumScheme;
