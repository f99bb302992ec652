use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Sealed data too short")]
    DataTooShort,

    #[error("Unsupported payload version: {0}")]
    UnsupportedVersion(u8),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Invalid P-256 private scalar: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid P-256 public point: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}
