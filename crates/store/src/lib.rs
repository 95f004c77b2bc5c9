//! Depot-side storage core.
//!
//! [`ChunkStore`] holds raw chunk bytes durably and idempotently until all
//! of a file's chunks have arrived. [`UploadSession`] answers "what do you
//! already have?" for a content hash and gates every byte movement.
//! [`Merger`] assembles the stored chunks into the byte-exact final file
//! with one concurrent range-writer per chunk.
//!
//! All durable state lives under a single [`StorageLayout`] root; nothing
//! is kept in memory across requests, which is what makes resume crash-safe.

mod chunks;
mod layout;
mod merger;
mod session;

pub use chunks::ChunkStore;
pub use layout::{StorageLayout, chunk_file_name, file_extension, parse_chunk_index};
pub use merger::{MergeReport, Merger};
pub use session::{ChunkAck, UploadSession, UploadState};

use chunkferry_protocol::ContentHash;

/// Errors produced by the store crate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Merge requested while the stored indices do not cover the expected
    /// range. Nothing is written; the upload can continue.
    #[error("upload incomplete: {} chunk(s) missing", missing.len())]
    IncompleteUpload { missing: Vec<u32> },

    /// A non-final chunk's size disagrees with the declared chunk size,
    /// which would corrupt every offset after it.
    #[error("chunk {index} has size {actual}, expected {expected}")]
    ChunkSizeMismatch {
        index: u32,
        expected: u64,
        actual: u64,
    },

    /// The assembled file does not hash to the claimed content hash.
    #[error("assembled file digest {actual} does not match claimed {expected}")]
    DigestMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("expected chunk count must be greater than zero")]
    InvalidChunkCount,
}
