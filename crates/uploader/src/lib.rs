//! Courier-side upload flow.
//!
//! [`Uploader`] drives a complete resumable upload against a depot: hash
//! the file (with progress events), ask the depot what it already holds,
//! send only the missing chunks, then request the merge. The depot is
//! reached through the [`ServerConnection`] trait so the flow is testable
//! without a socket; [`WsConnection`] is the real WebSocket implementation.

mod connection;
mod upload;

pub use connection::{ServerConnection, WsConnection};
pub use upload::{UploadEvent, UploadOutcome, Uploader};

/// Errors produced by the uploader crate.
#[derive(Debug, thiserror::Error)]
pub enum UploaderError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] chunkferry_transfer::TransferError),

    #[error("hashing failed: {0}")]
    Hash(String),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("depot error {code}: {message}")]
    Depot { code: i32, message: String },

    #[error("depot reports upload incomplete: {} chunk(s) missing", missing.len())]
    Incomplete { missing: Vec<u32> },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("upload cancelled")]
    Cancelled,
}
