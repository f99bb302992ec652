pub mod aes_gcm;
pub mod ecdh;
pub mod error;
pub mod hex_codec;
pub mod hkdf;
pub mod session;
pub mod types;

pub use aes_gcm::{open, seal};
pub use ecdh::{
    diffie_hellman, generate_key_pair, validate_public_point, EcdhKeyMaterial,
};
pub use error::CryptoError;
pub use hex_codec::{decode_hex, decode_hex_fixed, encode_hex};
pub use session::derive_session_key;
pub use types::{
    AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, AES_KEY_LENGTH, CURRENT_VERSION, P256_PUBLIC_LENGTH,
    P256_SCALAR_LENGTH, SUPPORTED_VERSIONS,
};
