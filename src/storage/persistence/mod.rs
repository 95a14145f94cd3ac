//! Primary store implementations.

mod sqlite;

pub use sqlite::SqlitePersistenceBackend;
