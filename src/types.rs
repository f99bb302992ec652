//! Key records held by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use keypool_crypto::{encode_hex, AES_KEY_LENGTH, P256_SCALAR_LENGTH};

/// Opaque identifier shared by an ECDH pair and the session key it negotiates.
pub type KeyId = String;

/// Mint a fresh key id (UUID v4).
pub fn generate_key_id() -> KeyId {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// EcdhKeyPair
// ============================================================================

/// A one-time P-256 key pair. Immutable once created: rotation is
/// delete + regenerate.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EcdhKeyPair {
    key_id: KeyId,
    private_scalar: [u8; P256_SCALAR_LENGTH],
    public_point: Vec<u8>,
}

impl EcdhKeyPair {
    pub fn new(
        key_id: impl Into<KeyId>,
        private_scalar: [u8; P256_SCALAR_LENGTH],
        public_point: Vec<u8>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            private_scalar,
            public_point,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Device-only secret. Never serialized for transport.
    pub fn private_scalar(&self) -> &[u8; P256_SCALAR_LENGTH] {
        &self.private_scalar
    }

    /// SEC1 uncompressed point.
    pub fn public_point(&self) -> &[u8] {
        &self.public_point
    }

    /// The half that is published to the directory.
    pub fn public_half(&self) -> PublicKeyHalf {
        PublicKeyHalf {
            key_id: self.key_id.clone(),
            public_key: encode_hex(&self.public_point),
        }
    }
}

impl std::fmt::Debug for EcdhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeyPair")
            .field("key_id", &self.key_id)
            .field("public_point", &encode_hex(&self.public_point))
            .finish_non_exhaustive()
    }
}

/// Public half of an `EcdhKeyPair` as sent to the directory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyHalf {
    pub key_id: KeyId,
    /// Hex-encoded SEC1 uncompressed point.
    pub public_key: String,
}

// ============================================================================
// SymmetricSessionKey
// ============================================================================

/// Which per-direction counter of a session key to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceDirection {
    /// Messages we send.
    Local,
    /// Messages we receive.
    Remote,
}

impl SequenceDirection {
    pub(crate) fn column(self) -> &'static str {
        match self {
            SequenceDirection::Local => "local_sequence",
            SequenceDirection::Remote => "remote_sequence",
        }
    }
}

/// Sequence counters start here for every new session key.
pub const INITIAL_SEQUENCE: i64 = 1;

/// Symmetric key derived from a completed exchange.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricSessionKey {
    #[zeroize(skip)]
    pub key_id: KeyId,
    pub key_material: [u8; AES_KEY_LENGTH],
    #[zeroize(skip)]
    pub local_sequence: i64,
    #[zeroize(skip)]
    pub remote_sequence: i64,
    /// `None` on insert lets the store stamp `created_at + ttl`.
    #[zeroize(skip)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SymmetricSessionKey {
    /// A new key with both counters at `INITIAL_SEQUENCE` and no expiration yet.
    pub fn new(key_id: impl Into<KeyId>, key_material: [u8; AES_KEY_LENGTH]) -> Self {
        Self {
            key_id: key_id.into(),
            key_material,
            local_sequence: INITIAL_SEQUENCE,
            remote_sequence: INITIAL_SEQUENCE,
            expires_at: None,
        }
    }
}

impl std::fmt::Debug for SymmetricSessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricSessionKey")
            .field("key_id", &self.key_id)
            .field("local_sequence", &self.local_sequence)
            .field("remote_sequence", &self.remote_sequence)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
