use thiserror::Error;

/// Errors raised by the key store, pool manager, and secure channel.
///
/// Network failures are not represented here: they are `PublishError`
/// values consumed by the upload coordinator and always end in a retry.
#[derive(Debug, Error)]
pub enum KeypoolError {
    /// Insert of an identifier that already exists. Callers mint a new id.
    #[error("Duplicate key id: {0}")]
    DuplicateKeyId(String),

    /// Store access from a process other than the one that opened it.
    #[error("Permission denied: store owned by pid {owner}, called from pid {caller}")]
    PermissionDenied { owner: u32, caller: u32 },

    /// Outbound send with no live session key for the key id.
    #[error("No active session for key id {0}")]
    NoActiveSession(String),

    /// Inbound message referencing a key id we hold no session key for.
    #[error("Unknown session for key id {0}")]
    UnknownSession(String),

    /// Inbound sequence not strictly greater than the stored remote sequence.
    #[error("Replay detected for key id {key_id}: sequence {sequence} <= {current}")]
    ReplayDetected {
        key_id: String,
        sequence: i64,
        current: i64,
    },

    #[error("Invalid channel message: {0}")]
    InvalidMessage(String),

    /// Channel transport refused an outbound message.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] keypool_crypto::CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KeypoolError>;
