pub mod intent;
pub mod manager;
pub mod runtime;
pub mod worker;

pub use intent::{PoolIntent, RequestKind};
pub use manager::{KeyPoolManager, PoolOutcome};
pub use runtime::KeyPoolRuntime;
pub use worker::{KeyPoolHandle, KeyPoolWorker, WeakKeyPoolHandle, WorkerMessage};
