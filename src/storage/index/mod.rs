//! Search index implementations.

mod query;
mod sqlite;

pub use query::render_fts5;
pub use sqlite::SqliteIndexBackend;
