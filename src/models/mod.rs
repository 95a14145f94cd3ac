//! Data models for idiomstore.

mod app_config;
mod history;
mod idiom;
mod key;
mod search;

pub use app_config::{AppConfigProperty, ApplicationConfig, Toggles};
pub use history::HistoryItem;
pub use idiom::{Idiom, IdiomId, ImplId, Implementation, normalize_language, normalize_word};
pub use key::StorageKey;
pub use search::{IdiomField, IdiomOrder, IdiomQuery, SearchDocument, TextQuery};
