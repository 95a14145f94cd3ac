//! `SQLite` FTS5 search index.

use super::query::render_fts5;
use crate::models::{SearchDocument, TextQuery};
use crate::storage::sqlite::{
    acquire_lock, measured, open_connection, sqlite_error, with_transaction,
};
use crate::storage::traits::IndexBackend;
use crate::Result;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::instrument;

const BACKEND: &str = "sqlite_index";

/// Full-text index stored in an FTS5 virtual table.
///
/// The table `idiom_search` has the unindexed identity columns `doc_id` and
/// `idiom_id`, and the indexed columns `bulk` and `langs`, tokenized with the
/// porter stemmer over `unicode61`.
pub struct SqliteIndexBackend {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteIndexBackend {
    /// Opens (and creates if needed) the index at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let backend = Self {
            conn: Mutex::new(open_connection(Some(&db_path))?),
            db_path: Some(db_path),
        };
        backend.initialize()?;
        Ok(backend)
    }

    /// Creates an in-memory index (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let backend = Self {
            conn: Mutex::new(open_connection(None)?),
            db_path: None,
        };
        backend.initialize()?;
        Ok(backend)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS idiom_search USING fts5(
                doc_id UNINDEXED,
                idiom_id UNINDEXED,
                bulk,
                langs,
                tokenize = 'porter unicode61'
            )",
            [],
        )
        .map_err(sqlite_error("create_fts_table"))?;
        Ok(())
    }
}

impl IndexBackend for SqliteIndexBackend {
    #[instrument(skip(self, document), fields(operation = "put", backend = BACKEND, doc_id = %document.doc_id))]
    fn put(&self, document: &SearchDocument) -> Result<()> {
        measured(BACKEND, "put", || {
            let conn = acquire_lock(&self.conn);
            with_transaction(&conn, |conn| {
                conn.execute(
                    "DELETE FROM idiom_search WHERE doc_id = ?1",
                    params![document.doc_id],
                )
                .map_err(sqlite_error("delete_document"))?;
                conn.execute(
                    "INSERT INTO idiom_search (doc_id, idiom_id, bulk, langs) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        document.doc_id,
                        document.idiom_id,
                        document.bulk,
                        document.langs
                    ],
                )
                .map_err(sqlite_error("insert_document"))?;
                Ok(())
            })
        })
    }

    #[instrument(skip(self), fields(operation = "remove", backend = BACKEND))]
    fn remove(&self, doc_id: &str) -> Result<bool> {
        measured(BACKEND, "remove", || {
            let conn = acquire_lock(&self.conn);
            let deleted = conn
                .execute("DELETE FROM idiom_search WHERE doc_id = ?1", params![doc_id])
                .map_err(sqlite_error("remove_document"))?;
            Ok(deleted > 0)
        })
    }

    #[instrument(skip(self, query), fields(operation = "search", backend = BACKEND, limit = limit))]
    fn search(&self, query: &TextQuery, limit: usize) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let Some(expression) = render_fts5(query) else {
            return Ok(Vec::new());
        };
        tracing::debug!(expression = %expression, "FTS5 query");

        measured(BACKEND, "search", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(
                    "SELECT doc_id FROM idiom_search
                     WHERE idiom_search MATCH ?1
                     ORDER BY rank
                     LIMIT ?2",
                )
                .map_err(sqlite_error("prepare_search"))?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            stmt.query_map(params![expression, limit], |row| row.get::<_, String>(0))
                .map_err(sqlite_error("execute_search"))?
                .map(|r| r.map_err(sqlite_error("read_search_row")))
                .collect()
        })
    }

    #[instrument(skip(self), fields(operation = "clear", backend = BACKEND))]
    fn clear(&self) -> Result<()> {
        measured(BACKEND, "clear", || {
            let conn = acquire_lock(&self.conn);
            conn.execute("DELETE FROM idiom_search", [])
                .map_err(sqlite_error("clear_index"))?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(operation = "count", backend = BACKEND))]
    fn count(&self) -> Result<usize> {
        measured(BACKEND, "count", || {
            let conn = acquire_lock(&self.conn);
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM idiom_search", [], |row| row.get(0))
                .map_err(sqlite_error("count_documents"))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }
}
