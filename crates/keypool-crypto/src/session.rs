//! Session key derivation from an ECDH shared secret.
//!
//! sessionKey = HKDF-SHA256(sharedSecret, salt="keypool:session-salt:v1", info="keypool:session:v1\0{keyId}")

use crate::error::CryptoError;
use crate::hkdf::hkdf_derive;
use crate::types::AES_KEY_LENGTH;

const SESSION_SALT: &[u8] = b"keypool:session-salt:v1";
const SESSION_INFO_PREFIX: &str = "keypool:session:v1\0";

/// Derive the symmetric session key for the exchange identified by `key_id`.
pub fn derive_session_key(
    shared_secret: &[u8],
    key_id: &str,
) -> Result<[u8; AES_KEY_LENGTH], CryptoError> {
    if shared_secret.is_empty() {
        return Err(CryptoError::DerivationFailed(
            "empty shared secret".to_string(),
        ));
    }
    let info = format!("{}{}", SESSION_INFO_PREFIX, key_id);
    hkdf_derive(shared_secret, SESSION_SALT, info.as_bytes())
}
