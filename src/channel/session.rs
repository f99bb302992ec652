//! Completing a key exchange against one of our published pairs.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::crypto::KeyExchangeCrypto;
use crate::error::{KeypoolError, Result};
use crate::storage::KeyStore;
use crate::types::SymmetricSessionKey;

pub struct SessionEstablisher {
    store: Arc<dyn KeyStore>,
    crypto: Arc<dyn KeyExchangeCrypto>,
}

impl SessionEstablisher {
    pub fn new(store: Arc<dyn KeyStore>, crypto: Arc<dyn KeyExchangeCrypto>) -> Self {
        Self { store, crypto }
    }

    /// Derive and store the session key for `key_id` from the peer's hex
    /// public point, then delete the consumed pair.
    ///
    /// `UnknownSession` if we hold no pair for `key_id` (never issued, or
    /// already used). The peer point must be an uncompressed P-256 point on
    /// the curve; otherwise the pair is kept and a `Crypto` error returned.
    pub fn establish(&self, key_id: &str, peer_public_hex: &str) -> Result<SymmetricSessionKey> {
        let pair = self
            .store
            .get_ecdh_key_pair(key_id)?
            .ok_or_else(|| KeypoolError::UnknownSession(key_id.to_string()))?;
        let peer_public = keypool_crypto::decode_hex(peer_public_hex)?;
        keypool_crypto::validate_public_point(&peer_public)?;

        let session = self.crypto.derive_session_key(&pair, &peer_public)?;
        let stored = self.store.insert_symmetric_key(&session)?;

        let consumed: HashSet<_> = [key_id.to_string()].into_iter().collect();
        self.store.delete_ecdh_key_pairs(&consumed)?;
        info!(key_id, "session key established");
        Ok(stored)
    }
}
