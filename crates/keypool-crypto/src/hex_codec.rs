//! Hex encoding for key halves stored on disk and sent to the directory.

use crate::error::CryptoError;

pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn decode_hex(text: &str) -> Result<Vec<u8>, CryptoError> {
    hex::decode(text).map_err(|e| CryptoError::InvalidHex(e.to_string()))
}

/// Decode hex into a fixed-size array, rejecting any other length.
pub fn decode_hex_fixed<const N: usize>(text: &str) -> Result<[u8; N], CryptoError> {
    let bytes = decode_hex(text)?;
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| CryptoError::InvalidKeyLength {
        expected: N,
        got: bytes.len(),
    })
}
