//! SQLite-backed `KeyStore`.
//!
//! Two tables, `ecdh_keys` and `symmetric_keys`, behind one connection guarded
//! by a `parking_lot::Mutex`. Session key expiration is stamped by an insert
//! trigger so the rule lives with the data rather than with each caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::broadcast;
use tracing::debug;
use zeroize::Zeroizing;

use keypool_crypto::{decode_hex, decode_hex_fixed, encode_hex, AES_KEY_LENGTH, P256_SCALAR_LENGTH};

use crate::clock::{Clock, SystemClock};
use crate::config::StoreOptions;
use crate::error::{KeypoolError, Result};
use crate::storage::access::AccessGuard;
use crate::storage::events::{EventBus, StoreEvent, StoreTable};
use crate::storage::traits::KeyStore;
use crate::types::{EcdhKeyPair, KeyId, SequenceDirection, SymmetricSessionKey};

/// Bumped whenever the table layout changes. Keys are ephemeral, so an
/// older layout is dropped rather than migrated.
const SCHEMA_VERSION: i32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Schema
// ============================================================================

fn migrate(conn: &Connection, ttl_secs: i64) -> rusqlite::Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version != 0 && version != SCHEMA_VERSION {
        debug!(from = version, to = SCHEMA_VERSION, "recreating key tables");
        conn.execute_batch(
            "DROP TABLE IF EXISTS symmetric_keys;
             DROP TABLE IF EXISTS ecdh_keys;",
        )?;
    }

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS symmetric_keys (
             id INTEGER PRIMARY KEY,
             key_id TEXT NOT NULL UNIQUE,
             symmetric_key TEXT NOT NULL,
             local_sequence INTEGER NOT NULL DEFAULT 1,
             remote_sequence INTEGER NOT NULL DEFAULT 1,
             created_at INTEGER NOT NULL,
             expiration INTEGER NOT NULL DEFAULT 0
         );
         CREATE TABLE IF NOT EXISTS ecdh_keys (
             id INTEGER PRIMARY KEY,
             key_id TEXT NOT NULL UNIQUE,
             private TEXT NOT NULL,
             public TEXT NOT NULL
         );
         DROP TRIGGER IF EXISTS update_expiration;
         CREATE TRIGGER update_expiration AFTER INSERT ON symmetric_keys
             WHEN NEW.expiration = 0
         BEGIN
             UPDATE symmetric_keys SET expiration = NEW.created_at + {ttl_secs}
             WHERE id = NEW.id;
         END;
         PRAGMA user_version = {SCHEMA_VERSION};"
    ))
}

// ============================================================================
// Row decoding
// ============================================================================

struct EcdhRow {
    key_id: String,
    private: Zeroizing<String>,
    public: String,
}

impl EcdhRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key_id: row.get(0)?,
            private: Zeroizing::new(row.get(1)?),
            public: row.get(2)?,
        })
    }

    fn decode(self) -> Result<EcdhKeyPair> {
        let private = decode_hex_fixed::<P256_SCALAR_LENGTH>(&self.private)?;
        let public = decode_hex(&self.public)?;
        Ok(EcdhKeyPair::new(self.key_id, private, public))
    }
}

struct SymmetricRow {
    key_id: String,
    key: Zeroizing<String>,
    local_sequence: i64,
    remote_sequence: i64,
    expiration: i64,
}

impl SymmetricRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key_id: row.get(0)?,
            key: Zeroizing::new(row.get(1)?),
            local_sequence: row.get(2)?,
            remote_sequence: row.get(3)?,
            expiration: row.get(4)?,
        })
    }

    fn decode(self) -> Result<SymmetricSessionKey> {
        let material = decode_hex_fixed::<AES_KEY_LENGTH>(&self.key)?;
        let mut key = SymmetricSessionKey::new(self.key_id.clone(), material);
        key.local_sequence = self.local_sequence;
        key.remote_sequence = self.remote_sequence;
        key.expires_at = Some(from_unix(self.expiration));
        Ok(key)
    }
}

const SELECT_SYMMETRIC: &str = "SELECT key_id, symmetric_key, local_sequence, remote_sequence, expiration
     FROM symmetric_keys WHERE key_id = ?1";

fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn map_insert_error(err: rusqlite::Error, key_id: &str) -> KeypoolError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            KeypoolError::DuplicateKeyId(key_id.to_string())
        }
        _ => err.into(),
    }
}

fn purge_expired(conn: &Connection, now: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM symmetric_keys WHERE expiration < ?1",
        params![now],
    )
}

// ============================================================================
// SqliteKeyStore
// ============================================================================

pub struct SqliteKeyStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    guard: AccessGuard,
    events: EventBus,
}

impl SqliteKeyStore {
    /// Open (or create) the store described by `options`. Expired session
    /// keys are purged before the store is handed out.
    pub fn open(options: &StoreOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = match &options.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrate(&conn, options.session_key_ttl_secs)?;

        let store = Self {
            conn: Mutex::new(conn),
            clock,
            guard: AccessGuard::current(),
            events: EventBus::new(options.event_capacity),
        };
        store.purge_expired_symmetric_keys()?;
        Ok(store)
    }

    /// In-memory store with default options and the system clock.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&StoreOptions::default(), Arc::new(SystemClock))
    }

    /// In-memory store with default options and the given clock.
    pub fn open_in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open(&StoreOptions::default(), clock)
    }

    /// Replace the owning-process check.
    pub fn with_access_guard(mut self, guard: AccessGuard) -> Self {
        self.guard = guard;
        self
    }

    fn now(&self) -> i64 {
        self.clock.now_unix()
    }

    /// Sweep expired session keys while the caller already holds the lock,
    /// announcing the sweep once the lock is gone.
    fn purge_then<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        self.guard.check()?;
        let now = self.now();
        let (purged, out) = {
            let mut conn = self.conn.lock();
            let purged = purge_expired(&conn, now)?;
            (purged, f(&mut *conn)?)
        };
        if purged > 0 {
            debug!(count = purged, "purged expired session keys");
            self.events.publish(StoreEvent::Purged { count: purged });
        }
        Ok(out)
    }
}

impl KeyStore for SqliteKeyStore {
    fn insert_ecdh_key_pair(&self, pair: &EcdhKeyPair) -> Result<()> {
        self.guard.check()?;
        let private = Zeroizing::new(encode_hex(pair.private_scalar()));
        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO ecdh_keys (key_id, private, public) VALUES (?1, ?2, ?3)",
                params![pair.key_id(), private.as_str(), encode_hex(pair.public_point())],
            )
            .map_err(|e| map_insert_error(e, pair.key_id()))?;
        }
        self.events.publish(StoreEvent::Inserted {
            table: StoreTable::EcdhKeys,
            key_id: pair.key_id().to_string(),
        });
        Ok(())
    }

    fn list_ecdh_key_pairs(&self) -> Result<Vec<EcdhKeyPair>> {
        self.guard.check()?;
        let rows = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare_cached("SELECT key_id, private, public FROM ecdh_keys ORDER BY id")?;
            let rows = stmt
                .query_map([], EcdhRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter().map(EcdhRow::decode).collect()
    }

    fn count_ecdh_key_pairs(&self) -> Result<usize> {
        self.guard.check()?;
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ecdh_keys", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn get_ecdh_key_pair(&self, key_id: &str) -> Result<Option<EcdhKeyPair>> {
        self.guard.check()?;
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT key_id, private, public FROM ecdh_keys WHERE key_id = ?1",
                params![key_id],
                EcdhRow::from_row,
            )
            .optional()?
        };
        row.map(EcdhRow::decode).transpose()
    }

    fn delete_ecdh_key_pairs(&self, key_ids: &HashSet<KeyId>) -> Result<usize> {
        self.guard.check()?;
        let count = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let mut count = 0;
            {
                let mut stmt = tx.prepare_cached("DELETE FROM ecdh_keys WHERE key_id = ?1")?;
                for key_id in key_ids {
                    count += stmt.execute(params![key_id])?;
                }
            }
            tx.commit()?;
            count
        };
        if count > 0 {
            self.events.publish(StoreEvent::Deleted {
                table: StoreTable::EcdhKeys,
                count,
            });
        }
        Ok(count)
    }

    fn insert_symmetric_key(&self, key: &SymmetricSessionKey) -> Result<SymmetricSessionKey> {
        let created_at = self.now();
        let expiration = key.expires_at.map(|at| at.timestamp()).unwrap_or(0);
        let material = Zeroizing::new(encode_hex(&key.key_material));

        let row = self.purge_then(|conn| {
            conn.execute(
                "INSERT INTO symmetric_keys
                     (key_id, symmetric_key, local_sequence, remote_sequence, created_at, expiration)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key.key_id,
                    material.as_str(),
                    key.local_sequence,
                    key.remote_sequence,
                    created_at,
                    expiration
                ],
            )
            .map_err(|e| map_insert_error(e, &key.key_id))?;
            Ok(conn.query_row(SELECT_SYMMETRIC, params![key.key_id], SymmetricRow::from_row)?)
        })?;

        self.events.publish(StoreEvent::Inserted {
            table: StoreTable::SymmetricKeys,
            key_id: key.key_id.clone(),
        });
        row.decode()
    }

    fn get_symmetric_key(&self, key_id: &str) -> Result<Option<SymmetricSessionKey>> {
        let row = self.purge_then(|conn| {
            Ok(conn
                .query_row(SELECT_SYMMETRIC, params![key_id], SymmetricRow::from_row)
                .optional()?)
        })?;
        row.map(SymmetricRow::decode).transpose()
    }

    fn delete_symmetric_key(&self, key_id: &str) -> Result<bool> {
        self.guard.check()?;
        let count = {
            let conn = self.conn.lock();
            conn.execute(
                "DELETE FROM symmetric_keys WHERE key_id = ?1",
                params![key_id],
            )?
        };
        if count > 0 {
            self.events.publish(StoreEvent::Deleted {
                table: StoreTable::SymmetricKeys,
                count,
            });
        }
        Ok(count > 0)
    }

    fn increment_sequence(&self, key_id: &str, which: SequenceDirection) -> Result<usize> {
        let now = self.now();
        let sql = format!(
            "UPDATE symmetric_keys SET {col} = {col} + 1 WHERE key_id = ?1 AND expiration >= ?2",
            col = which.column()
        );
        let count = self.purge_then(|conn| Ok(conn.execute(&sql, params![key_id, now])?))?;
        if count > 0 {
            self.events.publish(StoreEvent::SequenceAdvanced {
                key_id: key_id.to_string(),
                direction: which,
            });
        }
        Ok(count)
    }

    fn claim_local_sequence(&self, key_id: &str) -> Result<Option<i64>> {
        let now = self.now();
        let claimed = self.purge_then(|conn| {
            Ok(conn
                .query_row(
                    "UPDATE symmetric_keys SET local_sequence = local_sequence + 1
                     WHERE key_id = ?1 AND expiration >= ?2
                     RETURNING local_sequence",
                    params![key_id, now],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?)
        })?;
        if claimed.is_some() {
            self.events.publish(StoreEvent::SequenceAdvanced {
                key_id: key_id.to_string(),
                direction: SequenceDirection::Local,
            });
        }
        Ok(claimed)
    }

    fn advance_remote_sequence(&self, key_id: &str, sequence: i64) -> Result<bool> {
        let now = self.now();
        let count = self.purge_then(|conn| {
            Ok(conn.execute(
                "UPDATE symmetric_keys SET remote_sequence = ?2
                 WHERE key_id = ?1 AND remote_sequence < ?2 AND expiration >= ?3",
                params![key_id, sequence, now],
            )?)
        })?;
        if count > 0 {
            self.events.publish(StoreEvent::SequenceAdvanced {
                key_id: key_id.to_string(),
                direction: SequenceDirection::Remote,
            });
        }
        Ok(count > 0)
    }

    fn purge_expired_symmetric_keys(&self) -> Result<usize> {
        self.guard.check()?;
        let now = self.now();
        let count = {
            let conn = self.conn.lock();
            purge_expired(&conn, now)?
        };
        if count > 0 {
            debug!(count, "purged expired session keys");
            self.events.publish(StoreEvent::Purged { count });
        }
        Ok(count)
    }

    fn delete_all(&self) -> Result<()> {
        self.guard.check()?;
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM ecdh_keys", [])?;
            tx.execute("DELETE FROM symmetric_keys", [])?;
            tx.commit()?;
        }
        self.events.publish(StoreEvent::Cleared);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
