use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time to wait for a pong response (or any incoming message).
///
/// This acts as a read deadline: if *nothing* arrives within this window
/// the connection is considered dead. Set high enough to tolerate slow
/// chunk writes on the depot side during large uploads.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send pings (must be well under [`WS_PONG_WAIT`]).
pub const WS_PING_PERIOD: Duration = Duration::from_secs(5);

/// Maximum message size in bytes (50 MB).
///
/// Caps both text and binary frames; a chunk frame carries the chunk bytes
/// plus a small JSON header, so the usable chunk size is slightly below this.
pub const WS_MAX_MESSAGE_SIZE: usize = 50 * 1024 * 1024;

/// Timeout for request/response operations (text messages).
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for binary request/response operations (chunk uploads).
///
/// Chunk frames may take significantly longer than text requests due to
/// disk I/O and network conditions.
pub const WS_BINARY_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// WebSocket message type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Requests from courier to depot
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "verify")]
    Verify,
    #[serde(rename = "upload_chunk")]
    UploadChunk,
    #[serde(rename = "merge")]
    Merge,

    // Responses from depot to courier
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "verify_response")]
    VerifyResponse,
    #[serde(rename = "chunk_response")]
    ChunkResponse,
    #[serde(rename = "merge_response")]
    MergeResponse,
    #[serde(rename = "error")]
    Error,

    // Events from depot to courier (push notifications)
    #[serde(rename = "upload_progress")]
    UploadProgress,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}

/// Common WebSocket error codes.
pub const WS_ERR_CODE_BAD_REQUEST: i32 = 400;
pub const WS_ERR_CODE_NOT_FOUND: i32 = 404;
pub const WS_ERR_CODE_INTERNAL: i32 = 500;
pub const WS_ERR_CODE_NOT_IMPLEMENTED: i32 = 501;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_wire_names() {
        let json = serde_json::to_string(&MessageType::Verify).unwrap();
        assert_eq!(json, "\"verify\"");
        let json = serde_json::to_string(&MessageType::UploadChunk).unwrap();
        assert_eq!(json, "\"upload_chunk\"");
        let json = serde_json::to_string(&MessageType::MergeResponse).unwrap();
        assert_eq!(json, "\"merge_response\"");
    }

    #[test]
    fn unknown_message_type_is_forward_compatible() {
        let parsed: MessageType = serde_json::from_str("\"telepathy\"").unwrap();
        assert_eq!(parsed, MessageType::Unknown);
    }

    #[test]
    fn ping_period_is_under_pong_wait() {
        assert!(WS_PING_PERIOD < WS_PONG_WAIT);
    }
}
