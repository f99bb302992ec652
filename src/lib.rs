//! One-time ECDH key pool with directory publishing, and a replay-protected
//! command channel over the session keys derived from it.

pub mod channel;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod pool;
pub mod storage;
pub mod types;
pub mod upload;

pub use channel::{
    ChannelMessage, ChannelTransport, Command, CommandContext, CommandHandler, CommandRouter,
    ReceiveOutcome, SecureChannel, SessionEstablisher,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{KeypoolConfig, PoolOptions, StoreOptions, MINIMUM_KEYS, SESSION_KEY_TTL_SECS};
pub use crypto::{KeyExchangeCrypto, P256Crypto};
pub use error::{KeypoolError, Result};
pub use pool::{KeyPoolHandle, KeyPoolManager, KeyPoolRuntime, PoolIntent, PoolOutcome, RequestKind};
pub use storage::{AccessGuard, KeyStore, SqliteKeyStore, StoreEvent, StoreTable};
pub use types::{EcdhKeyPair, KeyId, PublicKeyHalf, SequenceDirection, SymmetricSessionKey};
pub use upload::{
    AccountContext, AccountProvider, BackoffPolicy, DirectoryClient, PublishError,
    PublishResponse, RetryScheduler, UploadCoordinator,
};
