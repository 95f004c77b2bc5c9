//! Binary chunk frame: 4-byte big-endian header length + JSON header + raw
//! chunk bytes.
//!
//! Chunk payloads ride in binary frames so multi-megabyte chunks skip
//! base64 inflation; only the small header is JSON.

use serde::{Deserialize, Serialize};

use chunkferry_protocol::ContentHash;

/// JSON header preceding the raw bytes in a chunk frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkFrameHeader {
    /// Request id for response correlation.
    pub id: String,
    pub content_hash: ContentHash,
    pub index: u32,
    pub filename: String,
    /// SHA-256 hex of the payload; empty disables per-chunk verification.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

/// Parses a raw binary WebSocket frame into header + payload.
///
/// Wire format: `[4 bytes: header_len (big-endian)][header_len bytes: JSON][rest: payload]`
pub fn parse_chunk_frame(data: &[u8]) -> Result<(ChunkFrameHeader, Vec<u8>), FrameError> {
    if data.len() < 4 {
        return Err(FrameError::TooShort);
    }

    let header_len = (data[0] as usize) << 24
        | (data[1] as usize) << 16
        | (data[2] as usize) << 8
        | (data[3] as usize);

    if data.len() < 4 + header_len {
        return Err(FrameError::HeaderTruncated {
            expected: header_len,
            got: data.len() - 4,
        });
    }

    let header: ChunkFrameHeader = serde_json::from_slice(&data[4..4 + header_len])
        .map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    let payload = data[4 + header_len..].to_vec();
    Ok((header, payload))
}

/// Encodes a chunk frame for sending over WebSocket.
pub fn encode_chunk_frame(
    header: &ChunkFrameHeader,
    payload: &[u8],
) -> Result<Vec<u8>, serde_json::Error> {
    let header_json = serde_json::to_vec(header)?;
    let header_len = header_json.len() as u32;

    let mut buf = Vec::with_capacity(4 + header_json.len() + payload.len());
    buf.extend_from_slice(&header_len.to_be_bytes());
    buf.extend_from_slice(&header_json);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Errors from chunk frame parsing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short (need at least 4 bytes)")]
    TooShort,

    #[error("header truncated: expected {expected} bytes, got {got}")]
    HeaderTruncated { expected: usize, got: usize },

    #[error("invalid header JSON: {0}")]
    InvalidJson(String),
}
