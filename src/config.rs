//! Configuration for the pool, the store, and retry backoff.
//!
//! Every field has a default; a JSON document only needs to name what it
//! overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{KeypoolError, Result};
use crate::upload::BackoffPolicy;

/// Number of unused key pairs the pool keeps on hand.
pub const MINIMUM_KEYS: usize = 25;

/// Session keys expire this long after insert.
pub const SESSION_KEY_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypoolConfig {
    pub pool: PoolOptions,
    pub store: StoreOptions,
    pub backoff: BackoffPolicy,
}

impl KeypoolConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: KeypoolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.minimum_keys == 0 {
            return Err(KeypoolError::InvalidConfig(
                "pool.minimum_keys must be at least 1".to_string(),
            ));
        }
        if self.pool.key_id_attempts == 0 {
            return Err(KeypoolError::InvalidConfig(
                "pool.key_id_attempts must be at least 1".to_string(),
            ));
        }
        if self.store.session_key_ttl_secs <= 0 {
            return Err(KeypoolError::InvalidConfig(
                "store.session_key_ttl_secs must be positive".to_string(),
            ));
        }
        self.backoff.validate()
    }
}

/// Options for `KeyPoolManager`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Pool floor (default: 25).
    pub minimum_keys: usize,
    /// How many times reconciliation may re-enter the ensure loop when the
    /// server leaves the pool short (default: 3).
    pub max_reconcile_rounds: usize,
    /// Fresh key ids tried when an insert collides (default: 3).
    pub key_id_attempts: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            minimum_keys: MINIMUM_KEYS,
            max_reconcile_rounds: 3,
            key_id_attempts: 3,
        }
    }
}

/// Options for `SqliteKeyStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Database file. `None` opens an in-memory database.
    pub path: Option<PathBuf>,
    /// Lifetime of a session key from insert (default: 3600).
    pub session_key_ttl_secs: i64,
    /// Capacity of the change-event broadcast buffer (default: 64).
    pub event_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            path: None,
            session_key_ttl_secs: SESSION_KEY_TTL_SECS,
            event_capacity: 64,
        }
    }
}
