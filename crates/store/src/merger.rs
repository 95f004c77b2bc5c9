use std::io::SeekFrom;
use std::path::PathBuf;

use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::task::JoinSet;

use chunkferry_protocol::ContentHash;

use crate::chunks::ChunkStore;
use crate::layout::StorageLayout;
use crate::StoreError;

/// Outcome of a successful merge.
#[derive(Debug, Clone)]
pub struct MergeReport {
    /// Final file path.
    pub path: PathBuf,
    /// Bytes written by this merge (0 if the file already existed).
    pub bytes_written: u64,
    /// Number of chunks assembled.
    pub chunks: u32,
}

/// Assembles stored chunks into the final byte-exact file.
///
/// The output is written to a temp path and renamed into place only after
/// every range-write has completed and been synced, so the final file never
/// exists in a partial state — its presence *is* the completion signal that
/// `verify` relies on.
#[derive(Debug, Clone)]
pub struct Merger {
    layout: StorageLayout,
    store: ChunkStore,
    verify_digest: bool,
}

impl Merger {
    pub fn new(layout: StorageLayout) -> Self {
        let store = ChunkStore::new(layout.clone());
        Self {
            layout,
            store,
            verify_digest: false,
        }
    }

    /// Enables re-hashing the assembled file against the claimed content
    /// hash before it is made visible. The hash is client-computed and
    /// otherwise trusted; this closes that gap at the cost of one extra
    /// read of the output.
    pub fn with_digest_verification(mut self, on: bool) -> Self {
        self.verify_digest = on;
        self
    }

    /// Merges chunks `0..expected_chunks` of `hash` into the final file.
    ///
    /// Completeness is an explicit precondition: if the stored indices do
    /// not cover the range contiguously, this fails with
    /// [`StoreError::IncompleteUpload`] before creating any output.
    /// Distinct indices target disjoint byte ranges, so each chunk gets its
    /// own writer task over a shared pre-sized output; all writers are
    /// joined before the output becomes visible, and any failure fails the
    /// whole merge.
    pub async fn merge(
        &self,
        hash: &ContentHash,
        filename: &str,
        chunk_size: u64,
        expected_chunks: u32,
    ) -> Result<MergeReport, StoreError> {
        if chunk_size == 0 {
            return Err(StoreError::InvalidChunkSize);
        }
        if expected_chunks == 0 {
            return Err(StoreError::InvalidChunkCount);
        }

        let stored = self.store.list(hash).await?;
        let missing: Vec<u32> = (0..expected_chunks)
            .filter(|i| !stored.contains(i))
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::IncompleteUpload { missing });
        }
        if let Some(&extra) = stored.iter().find(|&&i| i >= expected_chunks) {
            // Indices past the declared count are never merged.
            tracing::warn!(hash = %hash, extra, expected_chunks, "ignoring chunks past expected count");
        }

        // Size pre-pass: every non-final chunk must match the declared
        // chunk size or the offsets after it would be wrong.
        let mut total: u64 = 0;
        for index in 0..expected_chunks {
            let len = self.store.chunk_len(hash, index).await?;
            let is_last = index == expected_chunks - 1;
            if (!is_last && len != chunk_size) || (is_last && len > chunk_size) {
                return Err(StoreError::ChunkSizeMismatch {
                    index,
                    expected: chunk_size,
                    actual: len,
                });
            }
            total += len;
        }

        fs::create_dir_all(self.layout.root()).await?;
        let tmp = self
            .layout
            .root()
            .join(format!(".merge_{}_{}", hash, uuid::Uuid::new_v4()));

        // Pre-size so every writer stays inside the file.
        let out = fs::File::create(&tmp).await?;
        out.set_len(total).await?;
        drop(out);

        let mut writers = JoinSet::new();
        for index in 0..expected_chunks {
            let chunk_path = self.layout.chunk_path(hash, index);
            let out_path = tmp.clone();
            let offset = u64::from(index) * chunk_size;
            writers.spawn(async move {
                let data = fs::read(&chunk_path).await?;
                let mut out = fs::OpenOptions::new().write(true).open(&out_path).await?;
                out.seek(SeekFrom::Start(offset)).await?;
                out.write_all(&data).await?;
                out.flush().await?;
                Ok::<u64, StoreError>(data.len() as u64)
            });
        }

        // Joint join: the merge is complete only once every writer has
        // finished, and one failure fails them all.
        let mut bytes_written: u64 = 0;
        let mut first_err: Option<StoreError> = None;
        while let Some(joined) = writers.join_next().await {
            match joined {
                Ok(Ok(n)) => bytes_written += n,
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(join_err) => {
                    first_err.get_or_insert(StoreError::Io(std::io::Error::other(join_err)));
                }
            }
        }
        if let Some(e) = first_err {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }

        let out = fs::OpenOptions::new().write(true).open(&tmp).await?;
        out.sync_all().await?;
        drop(out);

        if self.verify_digest {
            let actual = hash_output(tmp.clone()).await;
            let actual = match actual {
                Ok(h) => h,
                Err(e) => {
                    let _ = fs::remove_file(&tmp).await;
                    return Err(e);
                }
            };
            if actual != *hash {
                let _ = fs::remove_file(&tmp).await;
                return Err(StoreError::DigestMismatch {
                    expected: hash.clone(),
                    actual,
                });
            }
        }

        let final_path = self.layout.final_path(hash, filename);
        fs::rename(&tmp, &final_path).await?;
        tracing::info!(hash = %hash, path = %final_path.display(), bytes = bytes_written, chunks = expected_chunks, "merge complete");

        Ok(MergeReport {
            path: final_path,
            bytes_written,
            chunks: expected_chunks,
        })
    }
}

/// Hashes the assembled output on the blocking pool.
async fn hash_output(path: PathBuf) -> Result<ContentHash, StoreError> {
    let result = tokio::task::spawn_blocking(move || chunkferry_transfer::hash_file(&path))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
    result.map_err(|e| match e {
        chunkferry_transfer::TransferError::Io(io) => StoreError::Io(io),
        other => StoreError::Io(std::io::Error::other(other.to_string())),
    })
}
