//! Primary store trait.

use crate::Result;
use crate::models::{AppConfigProperty, Idiom, IdiomQuery, ImplId, StorageKey};

/// Durable keyed storage of idiom records, the source of truth.
///
/// # Implementor Notes
///
/// - Methods use `&self`; use interior mutability for connection state
/// - Writes are single-record atomic, there is no cross-record transaction
///   except for [`save_app_config`](Self::save_app_config)
/// - Implementation ids are not constrained to be unique by the store
pub trait IdiomPersistence: Send + Sync {
    /// Retrieves an idiom by key.
    fn get(&self, key: &StorageKey) -> Result<Option<Idiom>>;

    /// Retrieves several idioms in one round trip.
    ///
    /// Returns one entry per key, in key order, `None` for missing records.
    fn get_batch(&self, keys: &[StorageKey]) -> Result<Vec<Option<Idiom>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Inserts or replaces the idiom stored under `key`.
    fn put(&self, key: &StorageKey, idiom: &Idiom) -> Result<()>;

    /// Deletes a record. Returns whether it existed.
    fn delete(&self, key: &StorageKey) -> Result<bool>;

    /// Deletes several records. Returns how many existed.
    fn delete_batch(&self, keys: &[StorageKey]) -> Result<usize> {
        let mut deleted = 0;
        for key in keys {
            if self.delete(key)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Lists the keys of all records.
    fn list_keys(&self) -> Result<Vec<StorageKey>>;

    /// Runs a filtered, ordered, bounded listing.
    fn query(&self, query: &IdiomQuery) -> Result<Vec<(StorageKey, Idiom)>>;

    /// Total number of records.
    fn count(&self) -> Result<usize> {
        Ok(self.list_keys()?.len())
    }

    /// All idioms claiming implementation `impl_id`.
    fn find_by_impl_id(&self, impl_id: ImplId) -> Result<Vec<(StorageKey, Idiom)>>;

    /// The idiom holding the highest implementation id, if any.
    fn idiom_with_max_impl_id(&self) -> Result<Option<(StorageKey, Idiom)>>;

    /// Language of the first implementation of each idiom, by idiom id.
    fn first_language_per_idiom(&self) -> Result<Vec<String>>;

    /// All application config property rows.
    fn load_app_config(&self) -> Result<Vec<AppConfigProperty>>;

    /// Replaces all application config property rows, atomically.
    fn save_app_config(&self, properties: &[AppConfigProperty]) -> Result<()>;
}
