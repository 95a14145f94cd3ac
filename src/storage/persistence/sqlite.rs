//! `SQLite`-based primary store.
//!
//! Idioms are stored one row each, as a JSON body plus the denormalized
//! columns used for ordering. A side table maps implementation ids and
//! languages to their owning idiom.

use crate::models::{
    AppConfigProperty, Idiom, IdiomField, IdiomId, IdiomQuery, ImplId, StorageKey,
};
use crate::storage::sqlite::{
    acquire_lock, measured, open_connection, sqlite_error, with_transaction,
};
use crate::storage::traits::IdiomPersistence;
use crate::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::instrument;

const BACKEND: &str = "sqlite_persistence";

/// `SQLite`-based primary store.
///
/// # Schema
///
/// - `idioms`: id, title, rating, version, dates (epoch millis), impl count,
///   and the full record as JSON in `body`
/// - `idiom_impls`: one row per implementation (`impl_id`, `idiom_id`,
///   `position`, `language`); `impl_id` is deliberately not unique
/// - `app_config_properties`: one row per toggle
pub struct SqlitePersistenceBackend {
    /// Protected by Mutex because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqlitePersistenceBackend {
    /// Opens (and creates if needed) the store at `db_path`.
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

    /// Creates an in-memory store (useful for testing).
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
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS idioms (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                rating INTEGER NOT NULL,
                version INTEGER NOT NULL,
                creation_date INTEGER NOT NULL,
                version_date INTEGER NOT NULL,
                impl_count INTEGER NOT NULL,
                body TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS idiom_impls (
                impl_id INTEGER NOT NULL,
                idiom_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                language TEXT NOT NULL COLLATE NOCASE,
                PRIMARY KEY (idiom_id, position)
            );
            CREATE TABLE IF NOT EXISTS app_config_properties (
                app_config_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                value INTEGER NOT NULL,
                PRIMARY KEY (app_config_id, name)
            );",
        )
        .map_err(sqlite_error("create_tables"))?;

        Self::create_indexes(&conn);
        Ok(())
    }

    fn create_indexes(conn: &Connection) {
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_idioms_rating ON idioms(rating DESC, id DESC)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_idioms_version_date ON idioms(version_date DESC, id DESC)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_idiom_impls_impl_id ON idiom_impls(impl_id)",
            [],
        );
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_idiom_impls_language ON idiom_impls(language, idiom_id)",
            [],
        );
    }
}

/// SQL column backing an order field.
const fn order_column(field: IdiomField) -> &'static str {
    match field {
        IdiomField::Id => "i.id",
        IdiomField::Rating => "i.rating",
        IdiomField::VersionDate => "i.version_date",
        IdiomField::CreationDate => "i.creation_date",
        IdiomField::Title => "i.title",
        IdiomField::ImplCount => "i.impl_count",
    }
}

/// Builds the listing SQL and its parameters.
fn build_query_sql(query: &IdiomQuery) -> (String, Vec<Value>) {
    let mut sql = String::from("SELECT i.body FROM idioms i");
    let mut params: Vec<Value> = Vec::new();

    if let Some(language) = &query.language {
        params.push(Value::Text(language.clone()));
        sql.push_str(&format!(
            " WHERE EXISTS (SELECT 1 FROM idiom_impls m WHERE m.idiom_id = i.id AND m.language = ?{})",
            params.len()
        ));
    }

    if !query.order.is_empty() {
        let clauses: Vec<String> = query
            .order
            .iter()
            .map(|o| {
                let direction = if o.descending { "DESC" } else { "ASC" };
                format!("{} {direction}", order_column(o.field))
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&clauses.join(", "));
    }

    // SQLite treats a negative LIMIT as unbounded
    let limit = if query.limit == 0 {
        -1
    } else {
        i64::try_from(query.limit).unwrap_or(i64::MAX)
    };
    params.push(Value::Integer(limit));
    sql.push_str(&format!(" LIMIT ?{}", params.len()));
    params.push(Value::Integer(i64::try_from(query.offset).unwrap_or(i64::MAX)));
    sql.push_str(&format!(" OFFSET ?{}", params.len()));

    (sql, params)
}

fn decode_body(body: &str) -> Result<Idiom> {
    serde_json::from_str(body)
        .map_err(|e| Error::Inconsistent(format!("undecodable idiom record: {e}")))
}

fn body_column(row: &Row<'_>) -> rusqlite::Result<String> {
    row.get(0)
}

/// Collects `(key, idiom)` pairs from rows whose first column is the body.
fn collect_idioms(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<(StorageKey, Idiom)>> {
    let mut stmt = conn.prepare(sql).map_err(sqlite_error("prepare_query"))?;
    let bodies = stmt
        .query_map(params_from_iter(params.iter()), body_column)
        .map_err(sqlite_error("query"))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(sqlite_error("query_row"))?;

    bodies
        .iter()
        .map(|body| {
            let idiom = decode_body(body)?;
            Ok((StorageKey::for_idiom(idiom.id), idiom))
        })
        .collect()
}

fn insert_idiom(conn: &Connection, idiom: &Idiom) -> Result<()> {
    let body = serde_json::to_string(idiom)
        .map_err(|e| Error::upstream("sqlite", "encode_idiom", e))?;
    let impl_count = i64::try_from(idiom.impl_count).unwrap_or(i64::MAX);

    conn.execute(
        "INSERT OR REPLACE INTO idioms
            (id, title, rating, version, creation_date, version_date, impl_count, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            idiom.id.get(),
            idiom.title,
            idiom.rating,
            idiom.version,
            idiom.creation_date.timestamp_millis(),
            idiom.version_date.timestamp_millis(),
            impl_count,
            body
        ],
    )
    .map_err(sqlite_error("insert_idiom"))?;

    conn.execute(
        "DELETE FROM idiom_impls WHERE idiom_id = ?1",
        params![idiom.id.get()],
    )
    .map_err(sqlite_error("delete_impls"))?;

    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO idiom_impls (impl_id, idiom_id, position, language) VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(sqlite_error("prepare_insert_impl"))?;
    for (position, implementation) in idiom.implementations.iter().enumerate() {
        let position = i64::try_from(position).unwrap_or(i64::MAX);
        stmt.execute(params![
            implementation.id.get(),
            idiom.id.get(),
            position,
            implementation.language_name
        ])
        .map_err(sqlite_error("insert_impl"))?;
    }
    Ok(())
}

fn delete_idiom_rows(conn: &Connection, id: IdiomId) -> Result<bool> {
    conn.execute("DELETE FROM idiom_impls WHERE idiom_id = ?1", params![id.get()])
        .map_err(sqlite_error("delete_impls"))?;
    let deleted = conn
        .execute("DELETE FROM idioms WHERE id = ?1", params![id.get()])
        .map_err(sqlite_error("delete_idiom"))?;
    Ok(deleted > 0)
}

impl IdiomPersistence for SqlitePersistenceBackend {
    #[instrument(skip(self), fields(operation = "get", backend = BACKEND, key = %key))]
    fn get(&self, key: &StorageKey) -> Result<Option<Idiom>> {
        measured(BACKEND, "get", || {
            let conn = acquire_lock(&self.conn);
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM idioms WHERE id = ?1",
                    params![key.idiom_id().get()],
                    body_column,
                )
                .optional()
                .map_err(sqlite_error("get_idiom"))?;
            body.as_deref().map(decode_body).transpose()
        })
    }

    #[instrument(skip(self, keys), fields(operation = "get_batch", backend = BACKEND, count = keys.len()))]
    fn get_batch(&self, keys: &[StorageKey]) -> Result<Vec<Option<Idiom>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        measured(BACKEND, "get_batch", || {
            let conn = acquire_lock(&self.conn);
            let placeholders: Vec<String> = (1..=keys.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT i.body FROM idioms i WHERE i.id IN ({})",
                placeholders.join(", ")
            );
            let params: Vec<Value> = keys
                .iter()
                .map(|k| Value::Integer(k.idiom_id().get()))
                .collect();

            let by_id: HashMap<IdiomId, Idiom> = collect_idioms(&conn, &sql, &params)?
                .into_iter()
                .map(|(key, idiom)| (key.idiom_id(), idiom))
                .collect();

            Ok(keys
                .iter()
                .map(|key| by_id.get(&key.idiom_id()).cloned())
                .collect())
        })
    }

    #[instrument(skip(self, idiom), fields(operation = "put", backend = BACKEND, key = %key))]
    fn put(&self, key: &StorageKey, idiom: &Idiom) -> Result<()> {
        if key.idiom_id() != idiom.id {
            return Err(Error::InvalidInput(format!(
                "key {key} does not match idiom id {}",
                idiom.id
            )));
        }
        measured(BACKEND, "put", || {
            let conn = acquire_lock(&self.conn);
            with_transaction(&conn, |conn| insert_idiom(conn, idiom))
        })
    }

    #[instrument(skip(self), fields(operation = "delete", backend = BACKEND, key = %key))]
    fn delete(&self, key: &StorageKey) -> Result<bool> {
        measured(BACKEND, "delete", || {
            let conn = acquire_lock(&self.conn);
            with_transaction(&conn, |conn| delete_idiom_rows(conn, key.idiom_id()))
        })
    }

    #[instrument(skip(self, keys), fields(operation = "delete_batch", backend = BACKEND, count = keys.len()))]
    fn delete_batch(&self, keys: &[StorageKey]) -> Result<usize> {
        measured(BACKEND, "delete_batch", || {
            let conn = acquire_lock(&self.conn);
            with_transaction(&conn, |conn| {
                let mut deleted = 0;
                for key in keys {
                    if delete_idiom_rows(conn, key.idiom_id())? {
                        deleted += 1;
                    }
                }
                Ok(deleted)
            })
        })
    }

    #[instrument(skip(self), fields(operation = "list_keys", backend = BACKEND))]
    fn list_keys(&self) -> Result<Vec<StorageKey>> {
        measured(BACKEND, "list_keys", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare("SELECT id FROM idioms ORDER BY id")
                .map_err(sqlite_error("prepare_list_keys"))?;
            stmt.query_map([], |row| row.get::<_, i64>(0))
                .map_err(sqlite_error("list_keys"))?
                .map(|id| {
                    id.map(|id| StorageKey::for_idiom(IdiomId::new(id)))
                        .map_err(sqlite_error("list_keys_row"))
                })
                .collect()
        })
    }

    #[instrument(skip(self), fields(operation = "query", backend = BACKEND, limit = query.limit))]
    fn query(&self, query: &IdiomQuery) -> Result<Vec<(StorageKey, Idiom)>> {
        measured(BACKEND, "query", || {
            let conn = acquire_lock(&self.conn);
            let (sql, params) = build_query_sql(query);
            collect_idioms(&conn, &sql, &params)
        })
    }

    #[instrument(skip(self), fields(operation = "count", backend = BACKEND))]
    fn count(&self) -> Result<usize> {
        measured(BACKEND, "count", || {
            let conn = acquire_lock(&self.conn);
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM idioms", [], |row| row.get(0))
                .map_err(sqlite_error("count"))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    #[instrument(skip(self), fields(operation = "find_by_impl_id", backend = BACKEND, impl_id = %impl_id))]
    fn find_by_impl_id(&self, impl_id: ImplId) -> Result<Vec<(StorageKey, Idiom)>> {
        measured(BACKEND, "find_by_impl_id", || {
            let conn = acquire_lock(&self.conn);
            collect_idioms(
                &conn,
                "SELECT i.body FROM idioms i
                 WHERE i.id IN (SELECT m.idiom_id FROM idiom_impls m WHERE m.impl_id = ?1)
                 ORDER BY i.id",
                &[Value::Integer(impl_id.get())],
            )
        })
    }

    #[instrument(skip(self), fields(operation = "idiom_with_max_impl_id", backend = BACKEND))]
    fn idiom_with_max_impl_id(&self) -> Result<Option<(StorageKey, Idiom)>> {
        measured(BACKEND, "idiom_with_max_impl_id", || {
            let conn = acquire_lock(&self.conn);
            let found = collect_idioms(
                &conn,
                "SELECT i.body FROM idioms i
                 JOIN idiom_impls m ON m.idiom_id = i.id
                 ORDER BY m.impl_id DESC
                 LIMIT 1",
                &[],
            )?;
            Ok(found.into_iter().next())
        })
    }

    #[instrument(skip(self), fields(operation = "first_language_per_idiom", backend = BACKEND))]
    fn first_language_per_idiom(&self) -> Result<Vec<String>> {
        measured(BACKEND, "first_language_per_idiom", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare("SELECT language FROM idiom_impls WHERE position = 0 ORDER BY idiom_id")
                .map_err(sqlite_error("prepare_first_language"))?;
            stmt.query_map([], |row| row.get::<_, String>(0))
                .map_err(sqlite_error("first_language"))?
                .map(|r| r.map_err(sqlite_error("first_language_row")))
                .collect()
        })
    }

    #[instrument(skip(self), fields(operation = "load_app_config", backend = BACKEND))]
    fn load_app_config(&self) -> Result<Vec<AppConfigProperty>> {
        measured(BACKEND, "load_app_config", || {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(
                    "SELECT app_config_id, name, value FROM app_config_properties
                     ORDER BY app_config_id, name",
                )
                .map_err(sqlite_error("prepare_load_app_config"))?;
            stmt.query_map([], |row| {
                Ok(AppConfigProperty {
                    app_config_id: row.get(0)?,
                    name: row.get(1)?,
                    value: row.get(2)?,
                })
            })
            .map_err(sqlite_error("load_app_config"))?
            .map(|r| r.map_err(sqlite_error("load_app_config_row")))
            .collect()
        })
    }

    #[instrument(skip(self, properties), fields(operation = "save_app_config", backend = BACKEND, count = properties.len()))]
    fn save_app_config(&self, properties: &[AppConfigProperty]) -> Result<()> {
        measured(BACKEND, "save_app_config", || {
            let conn = acquire_lock(&self.conn);
            with_transaction(&conn, |conn| {
                conn.execute("DELETE FROM app_config_properties", [])
                    .map_err(sqlite_error("clear_app_config"))?;
                for property in properties {
                    conn.execute(
                        "INSERT INTO app_config_properties (app_config_id, name, value)
                         VALUES (?1, ?2, ?3)",
                        params![property.app_config_id, property.name, property.value],
                    )
                    .map_err(sqlite_error("insert_app_config"))?;
                }
                Ok(())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdiomOrder, Implementation};

    fn idiom(id: i64, rating: i64, impls: &[(i64, &str)]) -> Idiom {
        let mut idiom = Idiom::new(IdiomId::new(id), format!("Idiom {id}"));
        idiom.rating = rating;
        for (impl_id, lang) in impls {
            idiom
                .implementations
                .push(Implementation::new(ImplId::new(*impl_id), *lang, "code"));
        }
        idiom.refresh_impl_count();
        idiom
    }

    fn store(backend: &SqlitePersistenceBackend, idiom: &Idiom) {
        backend
            .put(&StorageKey::for_idiom(idiom.id), idiom)
            .unwrap();
    }

    fn ids(results: &[(StorageKey, Idiom)]) -> Vec<i64> {
        results.iter().map(|(_, i)| i.id.get()).collect()
    }

    #[test]
    fn test_put_and_get() {
        let backend = SqlitePersistenceBackend::in_memory().unwrap();
        let original = idiom(1, 3, &[(10, "Go"), (11, "Rust")]);
        store(&backend, &original);

        let loaded = backend.get(&StorageKey::for_idiom(IdiomId::new(1))).unwrap();
        assert_eq!(loaded, Some(original));
        assert!(backend.get(&StorageKey::for_idiom(IdiomId::new(2))).unwrap().is_none());
    }

    #[test]
    fn test_put_rejects_mismatched_key() {
        let backend = SqlitePersistenceBackend::in_memory().unwrap();
        let result = backend.put(&StorageKey::for_idiom(IdiomId::new(2)), &idiom(1, 0, &[]));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_put_replaces_implementations() {
        let backend = SqlitePersistenceBackend::in_memory().unwrap();
        store(&backend, &idiom(1, 0, &[(10, "Go"), (11, "Rust")]));
        store(&backend, &idiom(1, 0, &[(11, "Rust")]));

        assert!(backend.find_by_impl_id(ImplId::new(10)).unwrap().is_empty());
        assert_eq!(ids(&backend.find_by_impl_id(ImplId::new(11)).unwrap()), vec![1]);
    }

    #[test]
    fn test_get_batch_preserves_order_and_gaps() {
        let backend = SqlitePersistenceBackend::in_memory().unwrap();
        store(&backend, &idiom(1, 0, &[(1, "Go")]));
        store(&backend, &idiom(3, 0, &[(2, "Go")]));

        let keys = [3, 2, 1].map(|id| StorageKey::for_idiom(IdiomId::new(id)));
        let batch = backend.get_batch(&keys).unwrap();
        let found: Vec<Option<i64>> = batch.iter().map(|o| o.as_ref().map(|i| i.id.get())).collect();
        assert_eq!(found, vec![Some(3), None, Some(1)]);
    }

    #[test]
    fn test_delete_and_delete_batch() {
        let backend = SqlitePersistenceBackend::in_memory().unwrap();
        for id in 1..=4 {
            store(&backend, &idiom(id, 0, &[(id * 10, "Go")]));
        }

        assert!(backend.delete(&StorageKey::for_idiom(IdiomId::new(1))).unwrap());
        assert!(!backend.delete(&StorageKey::for_idiom(IdiomId::new(1))).unwrap());

        let keys = backend.list_keys().unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(backend.delete_batch(&keys).unwrap(), 3);
        assert_eq!(backend.count().unwrap(), 0);
        assert!(backend.first_language_per_idiom().unwrap().is_empty());
    }

    #[test]
    fn test_query_language_order_limit_offset() {
        let backend = SqlitePersistenceBackend::in_memory().unwrap();
        store(&backend, &idiom(1, 5, &[(1, "Go")]));
        store(&backend, &idiom(2, 9, &[(2, "Rust"), (3, "go")]));
        store(&backend, &idiom(3, 5, &[(4, "Python")]));
        store(&backend, &idiom(4, 1, &[(5, "Go")]));

        let query = IdiomQuery::new()
            .with_language("GO")
            .order_by(IdiomOrder::desc(IdiomField::Rating))
            .order_by(IdiomOrder::desc(IdiomField::Id));
        assert_eq!(ids(&backend.query(&query).unwrap()), vec![2, 1, 4]);

        let query = IdiomQuery::new()
            .order_by(IdiomOrder::desc(IdiomField::Rating))
            .order_by(IdiomOrder::desc(IdiomField::Id))
            .with_limit(2)
            .with_offset(1);
        assert_eq!(ids(&backend.query(&query).unwrap()), vec![3, 1]);

        let query = IdiomQuery::new().order_by(IdiomOrder::asc(IdiomField::Id));
        assert_eq!(ids(&backend.query(&query).unwrap()), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_idiom_with_max_impl_id() {
        let backend = SqlitePersistenceBackend::in_memory().unwrap();
        assert!(backend.idiom_with_max_impl_id().unwrap().is_none());

        store(&backend, &idiom(1, 0, &[(1, "Go"), (42, "C")]));
        store(&backend, &idiom(2, 0, &[(7, "Go")]));
        let (key, found) = backend.idiom_with_max_impl_id().unwrap().unwrap();
        assert_eq!(key, StorageKey::for_idiom(IdiomId::new(1)));
        assert_eq!(found.max_impl_id(), Some(ImplId::new(42)));
    }

    #[test]
    fn test_find_by_impl_id_reports_every_claimant() {
        let backend = SqlitePersistenceBackend::in_memory().unwrap();
        store(&backend, &idiom(1, 0, &[(5, "Go")]));
        store(&backend, &idiom(2, 0, &[(5, "Rust")]));
        assert_eq!(ids(&backend.find_by_impl_id(ImplId::new(5)).unwrap()), vec![1, 2]);
    }

    #[test]
    fn test_first_language_per_idiom() {
        let backend = SqlitePersistenceBackend::in_memory().unwrap();
        store(&backend, &idiom(1, 0, &[(1, "Go"), (2, "Rust")]));
        store(&backend, &idiom(2, 0, &[(3, "Go")]));
        assert_eq!(backend.first_language_per_idiom().unwrap(), vec!["Go", "Go"]);
    }

    #[test]
    fn test_app_config_replaces_all_rows() {
        let backend = SqlitePersistenceBackend::in_memory().unwrap();
        assert!(backend.load_app_config().unwrap().is_empty());

        let property = |name: &str, value| AppConfigProperty {
            app_config_id: 0,
            name: name.to_string(),
            value,
        };
        backend
            .save_app_config(&[property("a", true), property("b", false)])
            .unwrap();
        backend.save_app_config(&[property("c", true)]).unwrap();

        assert_eq!(backend.load_app_config().unwrap(), vec![property("c", true)]);
    }

    #[test]
    fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idioms.db");
        {
            let backend = SqlitePersistenceBackend::new(&path).unwrap();
            store(&backend, &idiom(1, 0, &[(1, "Go")]));
            assert_eq!(backend.db_path(), Some(path.as_path()));
        }
        let reopened = SqlitePersistenceBackend::new(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
