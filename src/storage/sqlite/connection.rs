//! Shared connection handling for `SQLite` backends.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Helper to acquire mutex lock with poison recovery.
///
/// If the mutex is poisoned (a previous critical section panicked), the inner
/// value is recovered and a warning is logged.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Maps a `rusqlite` error to [`Error::Upstream`] for `operation`.
pub fn sqlite_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::upstream("sqlite", operation, e)
}

/// Opens a database file, or an in-memory database when `path` is `None`.
///
/// # Errors
///
/// Returns [`Error::Upstream`] if the database cannot be opened.
pub fn open_connection(path: Option<&Path>) -> Result<Connection> {
    let conn = match path {
        Some(path) => Connection::open(path).map_err(sqlite_error("open_sqlite"))?,
        None => Connection::open_in_memory().map_err(sqlite_error("open_sqlite_in_memory"))?,
    };
    configure_connection(&conn)?;
    Ok(conn)
}

/// Configures a `SQLite` connection for concurrent use.
///
/// - **WAL mode**: concurrent readers with a single writer
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to 5 seconds on lock contention
///
/// Several backends open their own connection to the same file, so these
/// settings matter even though each connection sits behind a `Mutex`.
///
/// # Errors
///
/// Currently infallible; pragma failures are ignored because in-memory
/// databases reject WAL mode.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row, so pragma_update is used rather than execute_batch
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    Ok(())
}

/// Runs `f` inside a `BEGIN IMMEDIATE` transaction.
///
/// Commits when `f` succeeds, rolls back when `f` or the commit fails.
///
/// # Errors
///
/// Returns the error of `f`, or [`Error::Upstream`] if the transaction cannot
/// be started or committed.
pub fn with_transaction<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(sqlite_error("begin_transaction"))?;

    let result = f(conn).and_then(|value| {
        conn.execute_batch("COMMIT")
            .map_err(sqlite_error("commit_transaction"))?;
        Ok(value)
    });

    if result.is_err() && !conn.is_autocommit() {
        let _ = conn.execute_batch("ROLLBACK");
    }
    result
}
