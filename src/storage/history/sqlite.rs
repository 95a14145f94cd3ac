//! `SQLite` history log.

use crate::models::{HistoryItem, Idiom, IdiomId};
use crate::storage::sqlite::{acquire_lock, measured, open_connection, sqlite_error};
use crate::storage::traits::HistoryLog;
use crate::{Error, Result};
use chrono::DateTime;
use rusqlite::{Connection, params};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::instrument;

const BACKEND: &str = "sqlite_history";

/// Append-only `idiom_history` table.
///
/// Rows are never updated or deleted.
pub struct SqliteHistoryLog {
    conn: Mutex<Connection>,
}

impl SqliteHistoryLog {
    /// Opens (and creates if needed) the history log at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        Self::with_connection(open_connection(Some(&db_path))?)
    }

    /// Creates an in-memory history log (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(open_connection(None)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS idiom_history (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                idiom_id INTEGER NOT NULL,
                version INTEGER NOT NULL,
                recorded_at INTEGER NOT NULL,
                body TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_idiom_history_idiom ON idiom_history(idiom_id, seq);",
        )
        .map_err(sqlite_error("create_history_table"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl HistoryLog for SqliteHistoryLog {
    #[instrument(skip(self, item), fields(operation = "append", backend = BACKEND, idiom.id = %item.idiom.id, version = item.idiom.version))]
    fn append(&self, item: &HistoryItem) -> Result<()> {
        measured(BACKEND, "append", || {
            let body = serde_json::to_string(&item.idiom)
                .map_err(|e| Error::upstream("sqlite", "encode_history_item", e))?;
            let conn = acquire_lock(&self.conn);
            conn.execute(
                "INSERT INTO idiom_history (idiom_id, version, recorded_at, body)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    item.idiom.id.get(),
                    item.idiom.version,
                    item.recorded_at.timestamp_millis(),
                    body
                ],
            )
            .map_err(sqlite_error("append_history_item"))?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(operation = "list_for", backend = BACKEND, idiom.id = %idiom_id))]
    fn list_for(&self, idiom_id: IdiomId) -> Result<Vec<HistoryItem>> {
        measured(BACKEND, "list_for", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(
                    "SELECT recorded_at, body FROM idiom_history WHERE idiom_id = ?1 ORDER BY seq",
                )
                .map_err(sqlite_error("prepare_list_history"))?;
            let rows = stmt
                .query_map(params![idiom_id.get()], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(sqlite_error("list_history"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sqlite_error("list_history_row"))?;

            rows.into_iter()
                .map(|(recorded_at, body)| {
                    let idiom: Idiom = serde_json::from_str(&body).map_err(|e| {
                        Error::Inconsistent(format!("undecodable history item: {e}"))
                    })?;
                    let recorded_at = DateTime::from_timestamp_millis(recorded_at)
                        .ok_or_else(|| {
                            Error::Inconsistent(format!("invalid history timestamp {recorded_at}"))
                        })?;
                    Ok(HistoryItem { idiom, recorded_at })
                })
                .collect()
        })
    }
}
