//! WebSocket server framework for the depot.
//!
//! Accepts any number of concurrent client connections, dispatches JSON
//! envelopes and binary chunk frames to a [`Handler`] trait, and manages
//! connection lifecycle (ping/pong, graceful shutdown). Uploads for
//! different content hashes arrive over independent connections and never
//! contend with each other here.

mod binary;
mod connection;
mod handler;
mod server;

pub use binary::{ChunkFrameHeader, FrameError, encode_chunk_frame, parse_chunk_frame};
pub use connection::{ClientConnection, ClientMeta, SendError, Sender};
pub use handler::{Handler, HandlerFuture};
pub use server::{ServerConfig, UploadServer};

/// Send buffer capacity per connection.
///
/// During uploads the depot sends a progress event per chunk in addition to
/// the ACK. A small buffer can saturate and cause `try_send()` to silently
/// drop messages; 2048 gives comfortable headroom.
pub const SEND_BUFFER_SIZE: usize = 2048;

/// Errors produced by the server crate.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
