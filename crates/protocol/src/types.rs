use std::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when a string is not a valid content hash.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid content hash: {0}")]
pub struct InvalidHash(pub String);

/// Content-derived identity of a whole file: lowercase hex SHA-256.
///
/// The hash is the sole key for deduplication and resume, and it doubles as
/// a directory name on the depot side, so construction is strict: exactly
/// 64 ascii hex digits. Uppercase input is normalized to lowercase;
/// anything else is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Parses and validates a hash string.
    pub fn new(s: impl AsRef<str>) -> Result<Self, InvalidHash> {
        let s = s.as_ref();
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidHash(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Returns the hash as a lowercase hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = InvalidHash;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<ContentHash> for String {
    fn from(h: ContentHash) -> Self {
        h.0
    }
}

/// Depot's answer to a single chunk delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStatus {
    /// Chunk stored durably.
    #[serde(rename = "ok")]
    Ok,
    /// Chunk was already present; nothing written. Still a success.
    #[serde(rename = "alreadyExists")]
    AlreadyExists,
    /// The final file already exists; the chunk was discarded.
    #[serde(rename = "fileComplete")]
    FileComplete,
}

/// Depot's answer to a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStatus {
    #[serde(rename = "ok")]
    Ok,
    /// The stored indices do not cover the expected range; nothing merged.
    #[serde(rename = "incomplete")]
    Incomplete,
}
