//! Primary store keys.

use super::IdiomId;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const IDIOM_KIND: &str = "Idiom";

/// Opaque key of a primary store record.
///
/// The string form `Idiom:<id>` is also the identity of the record's search
/// document, so index hits decode straight back into primary keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    idiom_id: IdiomId,
}

impl StorageKey {
    /// Key of the idiom with the given id.
    #[must_use]
    pub const fn for_idiom(idiom_id: IdiomId) -> Self {
        Self { idiom_id }
    }

    /// The idiom id this key points to.
    #[must_use]
    pub const fn idiom_id(&self) -> IdiomId {
        self.idiom_id
    }

    /// Encodes the key to its string form.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decodes a key from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the string is not `Idiom:<id>` with
    /// a positive integer id.
    pub fn decode(encoded: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("malformed storage key: {encoded:?}"));
        let (kind, id) = encoded.split_once(':').ok_or_else(invalid)?;
        if kind != IDIOM_KIND {
            return Err(invalid());
        }
        let id: i64 = id.parse().map_err(|_| invalid())?;
        if id <= 0 {
            return Err(invalid());
        }
        Ok(Self::for_idiom(IdiomId::new(id)))
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{IDIOM_KIND}:{}", self.idiom_id)
    }
}

impl FromStr for StorageKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl Serialize for StorageKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StorageKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::decode(&encoded).map_err(serde::de::Error::custom)
    }
}
