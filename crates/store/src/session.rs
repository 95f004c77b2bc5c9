use std::collections::BTreeSet;
use std::io;
use std::time::{Duration, SystemTime};

use tokio::fs;

use chunkferry_protocol::ContentHash;

use crate::chunks::ChunkStore;
use crate::layout::StorageLayout;
use crate::merger::{MergeReport, Merger};
use crate::StoreError;

/// What the depot already holds for a content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    /// The final file exists; the client uploads nothing.
    Complete,
    /// Upload in progress (possibly empty); `stored` are the indices
    /// already held, so the client re-derives exactly the remaining work.
    Partial { stored: BTreeSet<u32> },
}

/// Acknowledgement for one delivered chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAck {
    /// Stored durably just now.
    Stored,
    /// Was already present; duplicate delivery is a success, not an error —
    /// the transport may retry a chunk whose ack was lost.
    AlreadyStored,
    /// The final file already exists; the chunk was discarded unread.
    FileComplete,
}

/// Server-side upload protocol, keyed purely by content hash.
///
/// There is no session token and no in-memory progress: identity is
/// content-derived and progress is the durable directory state, so a client
/// that crashes mid-upload resumes by re-hashing and calling
/// [`verify`](UploadSession::verify) again.
#[derive(Debug, Clone)]
pub struct UploadSession {
    layout: StorageLayout,
    store: ChunkStore,
    merger: Merger,
}

impl UploadSession {
    pub fn new(layout: StorageLayout) -> Self {
        let store = ChunkStore::new(layout.clone());
        let merger = Merger::new(layout.clone());
        Self {
            layout,
            store,
            merger,
        }
    }

    /// Enables digest re-verification on merge (see
    /// [`Merger::with_digest_verification`]).
    pub fn with_digest_verification(mut self, on: bool) -> Self {
        self.merger = self.merger.with_digest_verification(on);
        self
    }

    /// The underlying chunk store.
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Answers "do you already have this?" — the gate before any bytes move.
    pub async fn verify(
        &self,
        hash: &ContentHash,
        filename: &str,
    ) -> Result<UploadState, StoreError> {
        if fs::try_exists(self.layout.final_path(hash, filename)).await? {
            return Ok(UploadState::Complete);
        }
        Ok(UploadState::Partial {
            stored: self.store.list(hash).await?,
        })
    }

    /// Accepts one chunk, idempotently.
    pub async fn receive_chunk(
        &self,
        hash: &ContentHash,
        filename: &str,
        index: u32,
        data: &[u8],
    ) -> Result<ChunkAck, StoreError> {
        if fs::try_exists(self.layout.final_path(hash, filename)).await? {
            return Ok(ChunkAck::FileComplete);
        }
        if self.store.put(hash, index, data).await? {
            Ok(ChunkAck::Stored)
        } else {
            Ok(ChunkAck::AlreadyStored)
        }
    }

    /// Assembles the final file once the client believes all chunks are in.
    ///
    /// Already-merged uploads short-circuit (the chunk directory is gone by
    /// then, so this is also what makes a duplicate merge call succeed).
    /// After a fresh merge the chunk directory is removed in the background;
    /// cleanup never blocks or fails the response.
    pub async fn merge(
        &self,
        hash: &ContentHash,
        filename: &str,
        chunk_size: u64,
        expected_chunks: u32,
    ) -> Result<MergeReport, StoreError> {
        let final_path = self.layout.final_path(hash, filename);
        if fs::try_exists(&final_path).await? {
            tracing::debug!(hash = %hash, "merge requested but file already complete");
            return Ok(MergeReport {
                path: final_path,
                bytes_written: 0,
                chunks: expected_chunks,
            });
        }

        let report = self
            .merger
            .merge(hash, filename, chunk_size, expected_chunks)
            .await?;

        let store = self.store.clone();
        let hash = hash.clone();
        tokio::spawn(async move {
            if let Err(e) = store.remove_all(&hash).await {
                tracing::warn!(hash = %hash, "post-merge chunk cleanup failed: {e}");
            }
        });

        Ok(report)
    }

    /// Removes chunk directories (and abandoned merge temps) whose newest
    /// entry is older than `max_idle`. Returns how many were removed.
    ///
    /// The original design kept partial uploads forever; this is the
    /// garbage collector for uploads the client walked away from.
    pub async fn sweep_stale(&self, max_idle: Duration) -> Result<usize, StoreError> {
        let now = SystemTime::now();
        let mut entries = match fs::read_dir(self.layout.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            if name.starts_with("chunks_") {
                let path = entry.path();
                if dir_idle_longer_than(&path, now, max_idle).await? {
                    tracing::info!(dir = %path.display(), "sweeping stale upload");
                    if fs::remove_dir_all(&path).await.is_ok() {
                        removed += 1;
                    }
                }
            } else if name.starts_with(".merge_") {
                // Temp output of a merge that never finished.
                let meta = entry.metadata().await?;
                if is_older_than(meta.modified(), now, max_idle) {
                    let path = entry.path();
                    tracing::info!(file = %path.display(), "sweeping abandoned merge temp");
                    if fs::remove_file(&path).await.is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        Ok(removed)
    }
}

/// `true` when everything inside `dir` (and the dir itself) is idle.
async fn dir_idle_longer_than(
    dir: &std::path::Path,
    now: SystemTime,
    max_idle: Duration,
) -> Result<bool, StoreError> {
    let meta = fs::metadata(dir).await?;
    if !is_older_than(meta.modified(), now, max_idle) {
        return Ok(false);
    }
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !is_older_than(meta.modified(), now, max_idle) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_older_than(
    modified: io::Result<SystemTime>,
    now: SystemTime,
    max_idle: Duration,
) -> bool {
    match modified {
        Ok(mtime) => match now.duration_since(mtime) {
            Ok(age) => age > max_idle,
            // mtime in the future: treat as fresh.
            Err(_) => false,
        },
        // No mtime available: never sweep on guesswork.
        Err(_) => false,
    }
}
