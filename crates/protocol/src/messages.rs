use serde::{Deserialize, Serialize};

use crate::types::{ChunkStatus, ContentHash, MergeStatus};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Asks the depot what it already holds for a content hash.
///
/// The filename matters only for deriving the final file's extension; the
/// hash alone identifies the upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub filename: String,
    pub content_hash: ContentHash,
}

/// A chunk delivered as JSON.
///
/// `data` is base64-encoded on the wire. Large chunks should use the binary
/// frame instead (see the server crate); this form exists for small chunks
/// and for clients that cannot send binary frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkRequest {
    pub content_hash: ContentHash,
    pub index: u32,
    pub filename: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// SHA-256 hex of `data`; empty disables per-chunk verification.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

/// Asks the depot to assemble the final file.
///
/// `total_chunks` is the completeness precondition: the depot refuses to
/// merge unless stored indices cover `0..total_chunks` contiguously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub filename: String,
    pub content_hash: ContentHash,
    pub chunk_size: u64,
    pub total_chunks: u32,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Depot's answer to [`VerifyRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// `true` if the final file already exists; the client uploads nothing.
    pub is_uploaded: bool,
    /// Indices already stored, sorted ascending. Empty when `is_uploaded`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uploaded_list: Vec<u32>,
}

/// Depot's answer to a chunk delivery (JSON or binary frame).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub status: ChunkStatus,
}

/// Depot's answer to [`MergeRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub status: MergeStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Indices still missing when `status` is `incomplete`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<u32>,
}

// ---------------------------------------------------------------------------
// Event payloads (push notifications)
// ---------------------------------------------------------------------------

/// Emitted by the depot after each stored chunk.
///
/// Purely observational; the verify/merge protocol never depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgressEvent {
    pub content_hash: ContentHash,
    pub index: u32,
    /// Total indices stored so far for this hash.
    pub stored_count: u32,
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
