//! History log implementations.

mod sqlite;

pub use sqlite::SqliteHistoryLog;
