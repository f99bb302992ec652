//! Crypto seam: key generation, session key derivation, payload sealing.
//!
//! `P256Crypto` is the production implementation over `keypool-crypto`.
//! Everything here is treated as side-effect free by the pool and channel.

use keypool_crypto as kc;

use crate::error::Result;
use crate::types::{EcdhKeyPair, KeyId, SymmetricSessionKey};

pub trait KeyExchangeCrypto: Send + Sync {
    /// Generate a new key pair labelled with `key_id`.
    fn generate_key_pair(&self, key_id: KeyId) -> Result<EcdhKeyPair>;

    /// Complete the exchange for `pair` against the peer's SEC1 public point.
    fn derive_session_key(
        &self,
        pair: &EcdhKeyPair,
        peer_public: &[u8],
    ) -> Result<SymmetricSessionKey>;

    fn seal(&self, key_material: &[u8], payload: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    fn open(&self, key_material: &[u8], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct P256Crypto;

impl KeyExchangeCrypto for P256Crypto {
    fn generate_key_pair(&self, key_id: KeyId) -> Result<EcdhKeyPair> {
        let material = kc::generate_key_pair();
        Ok(EcdhKeyPair::new(
            key_id,
            *material.private_scalar(),
            material.public_point().to_vec(),
        ))
    }

    fn derive_session_key(
        &self,
        pair: &EcdhKeyPair,
        peer_public: &[u8],
    ) -> Result<SymmetricSessionKey> {
        let shared = kc::diffie_hellman(pair.private_scalar(), peer_public)?;
        let key = kc::derive_session_key(&shared, pair.key_id())?;
        Ok(SymmetricSessionKey::new(pair.key_id(), key))
    }

    fn seal(&self, key_material: &[u8], payload: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        Ok(kc::seal(key_material, payload, aad)?)
    }

    fn open(&self, key_material: &[u8], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        Ok(kc::open(key_material, sealed, aad)?)
    }
}
