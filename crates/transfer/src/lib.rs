//! Client-side transfer core: deterministic chunking and content hashing.
//!
//! [`split`] partitions a file size into reproducible index-addressed
//! spans, [`ChunkReader`] reads the corresponding bytes, and [`hasher`]
//! produces the whole-file [`ContentHash`](chunkferry_protocol::ContentHash)
//! that keys deduplication and resume.

mod chunker;
mod hasher;
mod types;

pub use chunker::{ChunkReader, ChunkSpan, split};
pub use hasher::{HashEvent, checksum_bytes, hash_file, spawn_hash};
pub use types::Chunk;

/// Default chunk size: 4 MiB.
///
/// Larger chunks reduce per-chunk overhead (SHA-256, ACKs, syscalls).
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Window size for streaming whole-file hashing: 1 MiB.
///
/// Independent of the transport chunk size; the resulting digest does not
/// depend on either.
pub const HASH_WINDOW_SIZE: usize = 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("chunk index {0} out of range")]
    IndexOutOfRange(u32),

    #[error("hashing task failed: {0}")]
    HashFailed(String),
}
