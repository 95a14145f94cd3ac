//! Cache payloads.
//!
//! Wire format: one tag byte naming the variant, followed by the variant body
//! as JSON. Decoding dispatches on the tag, so an entry written for one
//! operation is never mistaken for another shape.

use crate::models::{ApplicationConfig, Idiom, StorageKey};
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

const TAG_IDIOM: u8 = 1;
const TAG_KEYED_IDIOM: u8 = 2;
const TAG_IDIOM_LIST: u8 = 3;
const TAG_KEYED_IDIOM_LIST: u8 = 4;
const TAG_CONFIG: u8 = 5;
const TAG_STRING_LIST: u8 = 6;

/// A value held in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// One idiom, cached under its own id.
    Idiom(Idiom),
    /// One idiom with its storage key.
    KeyedIdiom {
        /// Storage key.
        key: StorageKey,
        /// The idiom.
        idiom: Idiom,
    },
    /// A list of idioms.
    IdiomList(Vec<Idiom>),
    /// Parallel lists of keys and idioms.
    KeyedIdiomList {
        /// Storage keys, one per idiom.
        keys: Vec<StorageKey>,
        /// The idioms.
        idioms: Vec<Idiom>,
    },
    /// Application configuration.
    Config(ApplicationConfig),
    /// A list of strings.
    StringList(Vec<String>),
}

impl CacheEntry {
    /// Variant name, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Idiom(_) => "Idiom",
            Self::KeyedIdiom { .. } => "KeyedIdiom",
            Self::IdiomList(_) => "IdiomList",
            Self::KeyedIdiomList { .. } => "KeyedIdiomList",
            Self::Config(_) => "Config",
            Self::StringList(_) => "StringList",
        }
    }

    /// Encodes the entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Self::Idiom(idiom) => tagged(TAG_IDIOM, idiom),
            Self::KeyedIdiom { key, idiom } => tagged(TAG_KEYED_IDIOM, &(key, idiom)),
            Self::IdiomList(idioms) => tagged(TAG_IDIOM_LIST, idioms),
            Self::KeyedIdiomList { keys, idioms } => tagged(TAG_KEYED_IDIOM_LIST, &(keys, idioms)),
            Self::Config(config) => tagged(TAG_CONFIG, config),
            Self::StringList(strings) => tagged(TAG_STRING_LIST, strings),
        }
    }

    /// Decodes an entry written by [`CacheEntry::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty payload, an unknown tag or
    /// a body that does not match its tag.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (&tag, body) = bytes
            .split_first()
            .ok_or_else(|| Error::InvalidInput("empty cache payload".to_string()))?;
        let entry = match tag {
            TAG_IDIOM => Self::Idiom(body_of(body)?),
            TAG_KEYED_IDIOM => {
                let (key, idiom) = body_of(body)?;
                Self::KeyedIdiom { key, idiom }
            },
            TAG_IDIOM_LIST => Self::IdiomList(body_of(body)?),
            TAG_KEYED_IDIOM_LIST => {
                let (keys, idioms) = body_of(body)?;
                Self::KeyedIdiomList { keys, idioms }
            },
            TAG_CONFIG => Self::Config(body_of(body)?),
            TAG_STRING_LIST => Self::StringList(body_of(body)?),
            other => {
                return Err(Error::InvalidInput(format!(
                    "unknown cache payload tag {other}"
                )));
            },
        };
        Ok(entry)
    }
}

fn tagged<T: Serialize + ?Sized>(tag: u8, body: &T) -> Result<Vec<u8>> {
    let mut bytes = vec![tag];
    serde_json::to_writer(&mut bytes, body)
        .map_err(|e| Error::InvalidInput(format!("unencodable cache payload: {e}")))?;
    Ok(bytes)
}

fn body_of<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| Error::InvalidInput(format!("corrupt cache payload: {e}")))
}
