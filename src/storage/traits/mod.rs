//! Storage backend traits.

mod cache;
mod history;
mod index;
mod persistence;

pub use cache::CacheBackend;
pub use history::HistoryLog;
pub use index::IndexBackend;
pub use persistence::IdiomPersistence;
