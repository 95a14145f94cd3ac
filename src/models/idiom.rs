//! Idiom and implementation records.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Splits free text into candidate words.
static WORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}_]+").unwrap_or_else(|_| unreachable!()));

/// Unique identifier of an idiom.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IdiomId(i64);

impl IdiomId {
    /// Creates an idiom id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for IdiomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of an implementation, across all idioms.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ImplId(i64);

impl ImplId {
    /// Creates an implementation id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ImplId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One language-specific solution of an idiom.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Implementation {
    /// Unique identifier.
    pub id: ImplId,
    /// Programming language, e.g. `Go` or `C++`.
    pub language_name: String,
    /// The code itself.
    pub code_block: String,
    /// Author of the first version.
    pub author: String,
    /// Creation timestamp.
    pub creation_date: DateTime<Utc>,
    /// Timestamp of the last edit.
    pub last_edit_date: DateTime<Utc>,
    /// Free-form explanation shown next to the code.
    pub comments_block: String,
    /// Where the snippet was found, if anywhere.
    pub origin_url: String,
    /// Link to relevant documentation.
    pub doc_url: String,
    /// Votes.
    pub rating: i64,
    /// Edit counter.
    pub version: u32,
}

impl Implementation {
    /// Creates an implementation with the given id, language and code.
    #[must_use]
    pub fn new(id: ImplId, language_name: impl Into<String>, code_block: impl Into<String>) -> Self {
        Self {
            id,
            language_name: language_name.into(),
            code_block: code_block.into(),
            ..Self::default()
        }
    }

    /// Returns true if this implementation is written in `language`.
    ///
    /// Comparison ignores case.
    #[must_use]
    pub fn is_in_language(&self, language: &str) -> bool {
        self.language_name.eq_ignore_ascii_case(language)
    }
}

/// A programming idiom: a title plus a set of per-language implementations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Idiom {
    /// Unique identifier.
    pub id: IdiomId,
    /// Short statement of the problem.
    pub title: String,
    /// Longer description of the problem.
    pub lead_paragraph: String,
    /// Extra search keywords, space-separated.
    pub keywords: String,
    /// Author of the first version.
    pub author: String,
    /// Creation timestamp.
    pub creation_date: DateTime<Utc>,
    /// Starts at 1, incremented on every update.
    pub version: u32,
    /// Timestamp of the last write.
    pub version_date: DateTime<Utc>,
    /// Votes.
    pub rating: i64,
    /// Number of implementations, recomputed on every save.
    pub impl_count: usize,
    /// Implementations, in display order.
    pub implementations: Vec<Implementation>,
}

impl Idiom {
    /// Creates an idiom without implementations.
    #[must_use]
    pub fn new(id: IdiomId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            ..Self::default()
        }
    }

    /// Appends an implementation, builder style.
    #[must_use]
    pub fn with_implementation(mut self, implementation: Implementation) -> Self {
        self.implementations.push(implementation);
        self
    }

    /// Sets `impl_count` to the actual number of implementations.
    pub fn refresh_impl_count(&mut self) {
        self.impl_count = self.implementations.len();
    }

    /// Finds an implementation by id, with its position.
    #[must_use]
    pub fn find_impl(&self, impl_id: ImplId) -> Option<(usize, &Implementation)> {
        self.implementations
            .iter()
            .enumerate()
            .find(|(_, implementation)| implementation.id == impl_id)
    }

    /// Highest implementation id of this idiom, if it has any implementation.
    #[must_use]
    pub fn max_impl_id(&self) -> Option<ImplId> {
        self.implementations.iter().map(|i| i.id).max()
    }

    /// Languages of the implementations, in implementation order.
    ///
    /// Duplicates are kept: an idiom may have several implementations in
    /// the same language.
    #[must_use]
    pub fn implemented_languages(&self) -> Vec<&str> {
        self.implementations
            .iter()
            .map(|i| i.language_name.as_str())
            .collect()
    }

    /// Returns true if at least one implementation is in `language`.
    #[must_use]
    pub fn has_language(&self, language: &str) -> bool {
        self.implementations
            .iter()
            .any(|i| i.is_in_language(language))
    }

    /// Normalized, deduplicated words of the idiom, for full-text indexing.
    ///
    /// Covers title, lead paragraph, keywords, implementation languages and
    /// implementation code. First occurrence order is preserved.
    #[must_use]
    pub fn extract_indexable_words(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut words = Vec::new();
        let mut push_text = |text: &str| {
            for raw in WORD_PATTERN.find_iter(text) {
                let word = normalize_word(raw.as_str());
                if !word.is_empty() && seen.insert(word.clone()) {
                    words.push(word);
                }
            }
        };

        push_text(&self.title);
        push_text(&self.lead_paragraph);
        push_text(&self.keywords);
        for implementation in &self.implementations {
            push_text(&implementation.language_name);
            push_text(&implementation.code_block);
        }
        words
    }

    /// Reorders implementations so that favorite languages come first.
    ///
    /// Favorite implementations appear in the order of `favorites`, keeping
    /// their relative order within one language. Other implementations
    /// follow in their original order, or are dropped when
    /// `see_non_favorite` is false.
    pub fn favorite_languages_first(&mut self, favorites: &[String], see_non_favorite: bool) {
        if favorites.is_empty() {
            if !see_non_favorite {
                self.implementations.clear();
            }
            return;
        }

        let mut remaining = std::mem::take(&mut self.implementations);
        let mut ordered = Vec::with_capacity(remaining.len());
        for favorite in favorites {
            let (matching, rest): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|i| i.is_in_language(favorite));
            ordered.extend(matching);
            remaining = rest;
        }
        if see_non_favorite {
            ordered.extend(remaining);
        }
        self.implementations = ordered;
    }
}

/// Normalizes a word for indexing and querying.
///
/// Lowercases and keeps only ASCII letters and digits. Accented letters are
/// dropped rather than transliterated.
#[must_use]
pub fn normalize_word(word: &str) -> String {
    word.chars()
        .flat_map(char::to_lowercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Normalizes a language name into a single indexable token.
///
/// `C++` becomes `cplusplus` and `C#` becomes `csharp`, so that language
/// names survive tokenization.
#[must_use]
pub fn normalize_language(language: &str) -> String {
    let mut normalized = String::with_capacity(language.len());
    for c in language.chars().flat_map(char::to_lowercase) {
        match c {
            '+' => normalized.push_str("plus"),
            '#' => normalized.push_str("sharp"),
            c if c.is_ascii_alphanumeric() => normalized.push(c),
            _ => {},
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Idiom {
        Idiom::new(IdiomId::new(7), "Reverse a list")
            .with_implementation(Implementation::new(ImplId::new(1), "Go", "reverse(x)"))
            .with_implementation(Implementation::new(ImplId::new(2), "Python", "x.reverse()"))
            .with_implementation(Implementation::new(ImplId::new(3), "go", "slices.Reverse(x)"))
            .with_implementation(Implementation::new(ImplId::new(4), "Rust", "x.reverse();"))
    }

    fn langs(idiom: &Idiom) -> Vec<&str> {
        idiom.implemented_languages()
    }

    #[test]
    fn test_find_impl() {
        let idiom = sample();
        let (pos, found) = idiom.find_impl(ImplId::new(3)).unwrap();
        assert_eq!(pos, 2);
        assert_eq!(found.code_block, "slices.Reverse(x)");
        assert!(idiom.find_impl(ImplId::new(99)).is_none());
    }

    #[test]
    fn test_max_impl_id() {
        assert_eq!(sample().max_impl_id(), Some(ImplId::new(4)));
        assert_eq!(Idiom::new(IdiomId::new(1), "empty").max_impl_id(), None);
    }

    #[test]
    fn test_refresh_impl_count() {
        let mut idiom = sample();
        assert_eq!(idiom.impl_count, 0);
        idiom.refresh_impl_count();
        assert_eq!(idiom.impl_count, 4);
    }

    #[test]
    fn test_has_language_ignores_case() {
        let idiom = sample();
        assert!(idiom.has_language("GO"));
        assert!(idiom.has_language("python"));
        assert!(!idiom.has_language("Java"));
    }

    #[test]
    fn test_favorite_languages_first_keeps_others() {
        let mut idiom = sample();
        idiom.favorite_languages_first(&["rust".to_string(), "Go".to_string()], true);
        assert_eq!(langs(&idiom), vec!["Rust", "Go", "go", "Python"]);
    }

    #[test]
    fn test_favorite_languages_first_drops_others() {
        let mut idiom = sample();
        idiom.favorite_languages_first(&["Python".to_string()], false);
        assert_eq!(langs(&idiom), vec!["Python"]);
    }

    #[test]
    fn test_favorite_languages_first_without_favorites() {
        let mut idiom = sample();
        idiom.favorite_languages_first(&[], true);
        assert_eq!(langs(&idiom), vec!["Go", "Python", "go", "Rust"]);
    }

    #[test]
    fn test_extract_indexable_words() {
        let mut idiom = sample();
        idiom.lead_paragraph = "Reverse the order of the elements.".to_string();
        idiom.keywords = "invert".to_string();
        let words = idiom.extract_indexable_words();

        assert_eq!(&words[..3], &["reverse", "a", "list"]);
        assert!(words.contains(&"invert".to_string()));
        assert!(words.contains(&"python".to_string()));
        assert!(words.contains(&"slices".to_string()));
        let unique: HashSet<_> = words.iter().collect();
        assert_eq!(unique.len(), words.len());
    }

    #[test]
    fn test_normalize_word() {
        assert_eq!(normalize_word("Hello,"), "hello");
        assert_eq!(normalize_word("x_1"), "x1");
        assert_eq!(normalize_word("Été"), "t");
        assert_eq!(normalize_word("!!"), "");
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("C++"), "cplusplus");
        assert_eq!(normalize_language("C#"), "csharp");
        assert_eq!(normalize_language("Objective-C"), "objectivec");
        assert_eq!(normalize_language("Go"), "go");
    }

    #[test]
    fn test_idiom_serde_defaults() {
        let idiom: Idiom = serde_json::from_str(r#"{"id": 3, "title": "Sum"}"#).unwrap();
        assert_eq!(idiom.id, IdiomId::new(3));
        assert!(idiom.implementations.is_empty());
        assert_eq!(idiom.version, 0);
    }
}
