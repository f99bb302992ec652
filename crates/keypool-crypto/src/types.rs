/// Wire format version for sealed channel payloads.
///
/// Version 1: AES-256-GCM, format [version=1:1B][IV:12B][ciphertext+tag]
pub const CURRENT_VERSION: u8 = 1;

/// Supported wire format versions (for opening).
pub const SUPPORTED_VERSIONS: &[u8] = &[1];

/// AES-GCM IV length in bytes (96 bits per NIST recommendation).
pub const AES_GCM_IV_LENGTH: usize = 12;

/// AES-GCM tag length in bytes (128 bits).
pub const AES_GCM_TAG_LENGTH: usize = 16;

/// AES key length in bytes (256 bits).
pub const AES_KEY_LENGTH: usize = 32;

/// P-256 private scalar length in bytes.
pub const P256_SCALAR_LENGTH: usize = 32;

/// SEC1 uncompressed P-256 point length: 0x04 || x || y.
pub const P256_PUBLIC_LENGTH: usize = 65;
