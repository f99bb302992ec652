//! Storage interface for key pairs and session keys.

use std::collections::HashSet;

use tokio::sync::broadcast;

use crate::error::Result;
use crate::storage::events::StoreEvent;
use crate::types::{EcdhKeyPair, KeyId, SequenceDirection, SymmetricSessionKey};

/// Persistent store of one-time ECDH key pairs and symmetric session keys.
///
/// Every mutation is atomic and, once committed, published to subscribers.
/// Every operation fails with `PermissionDenied` outside the owning process.
///
/// # Threading
/// All methods are synchronous and serialize on the underlying connection.
pub trait KeyStore: Send + Sync {
    // ------------------------------------------------------------------
    // ECDH key pairs
    // ------------------------------------------------------------------

    /// Persist a new pair. `DuplicateKeyId` if the id is taken.
    fn insert_ecdh_key_pair(&self, pair: &EcdhKeyPair) -> Result<()>;

    /// All pairs in insertion order.
    fn list_ecdh_key_pairs(&self) -> Result<Vec<EcdhKeyPair>>;

    fn count_ecdh_key_pairs(&self) -> Result<usize>;

    fn get_ecdh_key_pair(&self, key_id: &str) -> Result<Option<EcdhKeyPair>>;

    /// Remove matching pairs, returning how many rows went. Unknown ids are
    /// ignored.
    fn delete_ecdh_key_pairs(&self, key_ids: &HashSet<KeyId>) -> Result<usize>;

    // ------------------------------------------------------------------
    // Symmetric session keys
    // ------------------------------------------------------------------

    /// Persist a session key and return it as stored (expiration stamped
    /// if the caller left it unset). `DuplicateKeyId` if a live key exists.
    fn insert_symmetric_key(&self, key: &SymmetricSessionKey) -> Result<SymmetricSessionKey>;

    /// The live key for `key_id`. Expired rows are purged first.
    fn get_symmetric_key(&self, key_id: &str) -> Result<Option<SymmetricSessionKey>>;

    fn delete_symmetric_key(&self, key_id: &str) -> Result<bool>;

    /// Add one to the named counter. Returns rows affected: 0 when the key is
    /// absent or expired.
    fn increment_sequence(&self, key_id: &str, which: SequenceDirection) -> Result<usize>;

    /// Increment the local sequence and return the new value, as one step.
    /// Counters start at 1, so the first claimed value is 2: the lowest a
    /// peer's remote counter accepts.
    fn claim_local_sequence(&self, key_id: &str) -> Result<Option<i64>>;

    /// Store `sequence` as the remote counter if it is strictly greater than
    /// the current value. `false` means replay, or no live key.
    fn advance_remote_sequence(&self, key_id: &str, sequence: i64) -> Result<bool>;

    /// Delete every session key whose expiration has passed.
    fn purge_expired_symmetric_keys(&self) -> Result<usize>;

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Empty both tables. Used when the paired account is removed.
    fn delete_all(&self) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
