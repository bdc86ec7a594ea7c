pub mod adapter;
pub mod error;
pub mod memory;
pub mod schema;
pub mod slots;
pub mod sqlite;
pub mod traits;

pub use adapter::{ProjectStore, collection_digest};
pub use error::StorageError;
pub use memory::MemoryStore;
pub use slots::StoreKeys;
pub use sqlite::SqliteStore;
pub use traits::*;
