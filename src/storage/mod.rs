//! Storage layer.
//!
//! Four independent stores, each behind a trait:
//! - **Persistence**: authoritative idiom records (`SQLite`)
//! - **Index**: full-text search documents (`SQLite` FTS5), eventually consistent
//! - **History**: append-only idiom snapshots (`SQLite`)
//! - **Cache**: expiring encoded payloads (in-process LRU, Redis)
//!
//! There is no transaction spanning two stores.

// Dropping connection guards slightly earlier gives no benefit here.
#![allow(clippy::significant_drop_tightening)]

pub mod cache;
pub mod history;
pub mod index;
pub mod persistence;
pub mod sqlite;
pub mod traits;

pub use cache::MemoryCacheBackend;
#[cfg(feature = "redis")]
pub use cache::RedisCacheBackend;
pub use history::SqliteHistoryLog;
pub use index::SqliteIndexBackend;
pub use persistence::SqlitePersistenceBackend;
pub use traits::{CacheBackend, HistoryLog, IdiomPersistence, IndexBackend};
