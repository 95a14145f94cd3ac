//! Search documents, full-text queries and list queries.

use super::idiom::{normalize_language, normalize_word};
use super::{Idiom, StorageKey};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Derived full-text entry for one idiom.
///
/// Carries no displayable content: hits are resolved back to primary records
/// through `doc_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Encoded storage key of the idiom.
    pub doc_id: String,
    /// Numeric idiom id.
    pub idiom_id: i64,
    /// Space-separated normalized indexable words.
    pub bulk: String,
    /// Space-separated normalized implemented languages, duplicates allowed.
    pub langs: String,
}

impl SearchDocument {
    /// Builds the search document of an idiom stored under `key`.
    #[must_use]
    pub fn from_idiom(key: &StorageKey, idiom: &Idiom) -> Self {
        let langs: Vec<String> = idiom
            .implemented_languages()
            .into_iter()
            .map(normalize_language)
            .filter(|l| !l.is_empty())
            .collect();
        Self {
            doc_id: key.encode(),
            idiom_id: idiom.id.get(),
            bulk: idiom.extract_indexable_words().join(" "),
            langs: langs.join(" "),
        }
    }
}

/// Full-text query over search documents.
///
/// Word terms match stemmed prefixes in the indexable words, language terms
/// match any of the listed languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextQuery {
    /// All of these normalized words, prefix-matched.
    Words(Vec<String>),
    /// Any of these normalized languages.
    Languages(Vec<String>),
    /// Both sub-queries.
    And(Box<TextQuery>, Box<TextQuery>),
    /// The left sub-query but not the right one.
    AndNot(Box<TextQuery>, Box<TextQuery>),
}

impl TextQuery {
    /// Conjunction of words. Words normalizing to nothing are dropped.
    pub fn words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Words(
            words
                .into_iter()
                .map(|w| normalize_word(w.as_ref()))
                .filter(|w| !w.is_empty())
                .collect(),
        )
    }

    /// Disjunction of languages.
    pub fn languages<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Languages(
            languages
                .into_iter()
                .map(|l| normalize_language(l.as_ref()))
                .filter(|l| !l.is_empty())
                .collect(),
        )
    }

    /// `self AND other`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// `self AND NOT other`.
    #[must_use]
    pub fn and_not(self, other: Self) -> Self {
        Self::AndNot(Box::new(self), Box::new(other))
    }

    /// Returns true if the query can match nothing at all.
    ///
    /// An empty exclusion does not make an `AndNot` empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Words(terms) | Self::Languages(terms) => terms.is_empty(),
            Self::And(left, right) => left.is_empty() || right.is_empty(),
            Self::AndNot(left, _) => left.is_empty(),
        }
    }
}

/// Idiom fields usable for ordering lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdiomField {
    /// Idiom id.
    Id,
    /// Rating.
    Rating,
    /// Last write timestamp.
    VersionDate,
    /// Creation timestamp.
    CreationDate,
    /// Title.
    Title,
    /// Number of implementations.
    ImplCount,
}

impl IdiomField {
    /// Name of the field, as accepted by [`IdiomOrder::from_str`].
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "Id",
            Self::Rating => "Rating",
            Self::VersionDate => "VersionDate",
            Self::CreationDate => "CreationDate",
            Self::Title => "Title",
            Self::ImplCount => "ImplCount",
        }
    }

    /// Parses a field name, ignoring case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::Id,
            Self::Rating,
            Self::VersionDate,
            Self::CreationDate,
            Self::Title,
            Self::ImplCount,
        ]
        .into_iter()
        .find(|field| field.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for IdiomField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sort criterion: a field and a direction.
///
/// String form is the field name, prefixed with `-` for descending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdiomOrder {
    /// Field to sort on.
    pub field: IdiomField,
    /// Largest first.
    pub descending: bool,
}

impl IdiomOrder {
    /// Ascending order on `field`.
    #[must_use]
    pub const fn asc(field: IdiomField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    /// Descending order on `field`.
    #[must_use]
    pub const fn desc(field: IdiomField) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

impl fmt::Display for IdiomOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "-{}", self.field)
        } else {
            write!(f, "{}", self.field)
        }
    }
}

impl FromStr for IdiomOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (descending, name) = trimmed
            .strip_prefix('-')
            .map_or((false, trimmed), |rest| (true, rest));
        let field = IdiomField::parse(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown order field: {s:?}")))?;
        Ok(Self { field, descending })
    }
}

impl Serialize for IdiomOrder {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IdiomOrder {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Structured list query against the primary store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdiomQuery {
    /// Only idioms with at least one implementation in this language.
    pub language: Option<String>,
    /// Sort criteria, most significant first.
    pub order: Vec<IdiomOrder>,
    /// Maximum number of results, 0 for no limit.
    pub limit: usize,
    /// Number of leading results to skip.
    pub offset: usize,
}

impl IdiomQuery {
    /// Unfiltered, unordered, unbounded query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to idioms implemented in `language`.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Appends a sort criterion.
    #[must_use]
    pub fn order_by(mut self, order: IdiomOrder) -> Self {
        self.order.push(order);
        self
    }

    /// Sets the result cap, 0 meaning no cap.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the number of results to skip.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdiomId, ImplId, Implementation};
    use test_case::test_case;

    #[test_case("Id", IdiomOrder::asc(IdiomField::Id) ; "ascending id")]
    #[test_case("-Rating", IdiomOrder::desc(IdiomField::Rating) ; "descending rating")]
    #[test_case("-versiondate", IdiomOrder::desc(IdiomField::VersionDate) ; "case insensitive")]
    #[test_case(" ImplCount ", IdiomOrder::asc(IdiomField::ImplCount) ; "trimmed")]
    fn test_parse_order(input: &str, expected: IdiomOrder) {
        assert_eq!(input.parse::<IdiomOrder>().unwrap(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("-" ; "dash only")]
    #[test_case("Popularity" ; "unknown field")]
    fn test_parse_order_invalid(input: &str) {
        assert!(matches!(
            input.parse::<IdiomOrder>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_order_display_round_trip() {
        let order = IdiomOrder::desc(IdiomField::CreationDate);
        assert_eq!(order.to_string(), "-CreationDate");
        assert_eq!(order.to_string().parse::<IdiomOrder>().unwrap(), order);
    }

    #[test]
    fn test_text_query_words_normalized() {
        let query = TextQuery::words(["Hello,", "", "WORLD", "!!"]);
        assert_eq!(
            query,
            TextQuery::Words(vec!["hello".to_string(), "world".to_string()])
        );
    }

    #[test]
    fn test_text_query_is_empty() {
        assert!(TextQuery::words(["!!"]).is_empty());
        assert!(!TextQuery::words(["a"]).is_empty());
        assert!(TextQuery::words(["a"]).and(TextQuery::languages(Vec::<String>::new())).is_empty());
        assert!(!TextQuery::words(["a"]).and_not(TextQuery::languages(["?"])).is_empty());
    }

    #[test]
    fn test_search_document_from_idiom() {
        let idiom = Idiom::new(IdiomId::new(12), "Sort a map")
            .with_implementation(Implementation::new(ImplId::new(1), "C++", "std::sort"))
            .with_implementation(Implementation::new(ImplId::new(2), "Go", "sort.Slice"))
            .with_implementation(Implementation::new(ImplId::new(3), "Go", "slices.Sort"));
        let key = StorageKey::for_idiom(idiom.id);
        let doc = SearchDocument::from_idiom(&key, &idiom);

        assert_eq!(doc.doc_id, "Idiom:12");
        assert_eq!(doc.idiom_id, 12);
        assert_eq!(doc.langs, "cplusplus go go");
        assert!(doc.bulk.starts_with("sort a map"));
    }

    #[test]
    fn test_idiom_query_builder() {
        let query = IdiomQuery::new()
            .with_language("Rust")
            .order_by(IdiomOrder::desc(IdiomField::Rating))
            .with_limit(10)
            .with_offset(3);
        assert_eq!(query.language.as_deref(), Some("Rust"));
        assert_eq!(query.order.len(), 1);
        assert_eq!(query.limit, 10);
        assert_eq!(query.offset, 3);
    }
}
