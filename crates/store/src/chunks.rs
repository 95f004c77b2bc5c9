use std::collections::BTreeSet;
use std::io;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use chunkferry_protocol::ContentHash;

use crate::layout::{StorageLayout, parse_chunk_index};
use crate::StoreError;

/// Durable holding area for not-yet-merged chunks, keyed by
/// `(content hash, index)`.
///
/// All operations go straight to disk; there is no in-memory index, so the
/// store's answers survive a process restart and concurrent callers always
/// see each other's durable writes.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    layout: StorageLayout,
}

impl ChunkStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Stores a chunk durably. Idempotent: returns `false` without writing
    /// if the chunk is already present.
    ///
    /// The write goes to a temp file in the same directory followed by an
    /// atomic rename, so a concurrent put of the same index can never
    /// surface a half-written chunk — the loser of the race replaces the
    /// winner with identical bytes.
    pub async fn put(
        &self,
        hash: &ContentHash,
        index: u32,
        data: &[u8],
    ) -> Result<bool, StoreError> {
        let path = self.layout.chunk_path(hash, index);
        if fs::try_exists(&path).await? {
            return Ok(false);
        }

        let dir = self.layout.chunk_dir(hash);
        fs::create_dir_all(&dir).await?;

        let tmp = dir.join(format!(".tmp_{}_{}", index, uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &path).await?;
        tracing::debug!(hash = %hash, index, size = data.len(), "chunk stored");
        Ok(true)
    }

    /// Returns `true` if the chunk at `index` is stored.
    pub async fn exists(&self, hash: &ContentHash, index: u32) -> Result<bool, StoreError> {
        Ok(fs::try_exists(self.layout.chunk_path(hash, index)).await?)
    }

    /// Lists the stored indices for a content hash, sorted ascending.
    ///
    /// Entries that do not match the chunk naming contract (temp files,
    /// platform metadata artifacts) are filtered out — they are noise, not
    /// chunks. A missing directory is simply an empty set.
    pub async fn list(&self, hash: &ContentHash) -> Result<BTreeSet<u32>, StoreError> {
        let dir = self.layout.chunk_dir(hash);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };

        let mut stored = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            match parse_chunk_index(name) {
                Some(index) => {
                    stored.insert(index);
                }
                None => {
                    tracing::debug!(hash = %hash, entry = name, "ignoring non-chunk entry");
                }
            }
        }
        Ok(stored)
    }

    /// Size in bytes of a stored chunk.
    pub async fn chunk_len(&self, hash: &ContentHash, index: u32) -> Result<u64, StoreError> {
        Ok(fs::metadata(self.layout.chunk_path(hash, index)).await?.len())
    }

    /// Removes the whole chunk directory for a content hash.
    ///
    /// Missing directory is not an error (already cleaned up).
    pub async fn remove_all(&self, hash: &ContentHash) -> Result<(), StoreError> {
        match fs::remove_dir_all(self.layout.chunk_dir(hash)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_hash() -> ContentHash {
        ContentHash::new("a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3")
            .unwrap()
    }

    fn store_in(dir: &TempDir) -> ChunkStore {
        ChunkStore::new(StorageLayout::new(dir.path()))
    }

    #[tokio::test]
    async fn put_then_exists_and_list() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let hash = sample_hash();

        assert!(store.put(&hash, 0, b"aaaa").await.unwrap());
        assert!(store.put(&hash, 2, b"cc").await.unwrap());

        assert!(store.exists(&hash, 0).await.unwrap());
        assert!(!store.exists(&hash, 1).await.unwrap());

        let stored = store.list(&hash).await.unwrap();
        assert_eq!(stored.into_iter().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let hash = sample_hash();

        assert!(store.put(&hash, 0, b"bytes").await.unwrap());
        // Second delivery of the same chunk: no-op, not an error.
        assert!(!store.put(&hash, 0, b"bytes").await.unwrap());

        let stored = store.list(&hash).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(store.chunk_len(&hash, 0).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn concurrent_puts_of_same_index_leave_one_object() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let hash = sample_hash();

        let (a, b) = tokio::join!(
            store.put(&hash, 0, b"identical"),
            store.put(&hash, 0, b"identical"),
        );
        a.unwrap();
        b.unwrap();

        let stored = store.list(&hash).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(store.chunk_len(&hash, 0).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn concurrent_puts_of_distinct_indices() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let hash = sample_hash();

        let puts: Vec<_> = (0..16u32)
            .map(|i| {
                let store = store.clone();
                let hash = hash.clone();
                tokio::spawn(async move { store.put(&hash, i, &[i as u8; 8]).await })
            })
            .collect();
        for handle in puts {
            assert!(handle.await.unwrap().unwrap());
        }

        let stored = store.list(&hash).await.unwrap();
        assert_eq!(stored.len(), 16);
    }

    #[tokio::test]
    async fn list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let stored = store.list(&sample_hash()).await.unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn list_filters_noise_entries() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let hash = sample_hash();
        store.put(&hash, 1, b"x").await.unwrap();

        // Simulate platform metadata and a stray temp file.
        let chunk_dir = StorageLayout::new(dir.path()).chunk_dir(&hash);
        std::fs::write(chunk_dir.join(".DS_Store"), b"junk").unwrap();
        std::fs::write(chunk_dir.join(".tmp_3_deadbeef"), b"partial").unwrap();
        std::fs::write(chunk_dir.join("notes.txt"), b"hi").unwrap();

        let stored = store.list(&hash).await.unwrap();
        assert_eq!(stored.into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn remove_all_clears_and_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let hash = sample_hash();

        store.put(&hash, 0, b"x").await.unwrap();
        store.remove_all(&hash).await.unwrap();
        assert!(store.list(&hash).await.unwrap().is_empty());

        // Second removal: already gone, still Ok.
        store.remove_all(&hash).await.unwrap();
    }

    #[tokio::test]
    async fn empty_chunk_is_storable() {
        // A zero-length file's single chunk is empty but still real.
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let hash = sample_hash();

        assert!(store.put(&hash, 0, b"").await.unwrap());
        assert!(store.exists(&hash, 0).await.unwrap());
        assert_eq!(store.chunk_len(&hash, 0).await.unwrap(), 0);
    }
}
