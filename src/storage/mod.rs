pub mod access;
pub mod events;
pub mod sqlite;
pub mod traits;

pub use access::AccessGuard;
pub use events::{StoreEvent, StoreTable};
pub use sqlite::SqliteKeyStore;
pub use traits::KeyStore;
