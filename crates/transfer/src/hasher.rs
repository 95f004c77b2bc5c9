use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use chunkferry_protocol::ContentHash;

use crate::{HASH_WINDOW_SIZE, TransferError};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes the whole-file content hash, streaming in fixed windows.
///
/// The window size is independent of the transport chunk size, so the
/// digest identifies the file's bytes no matter how they are later chunked.
pub fn hash_file(path: &Path) -> Result<ContentHash, TransferError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_WINDOW_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    ContentHash::new(hex::encode(hasher.finalize()))
        .map_err(|e| TransferError::HashFailed(e.to_string()))
}

/// Event stream from a background hashing task.
#[derive(Debug, Clone)]
pub enum HashEvent {
    /// Fractional progress, 0–100. Observational only.
    Progress { percent: f64 },
    /// Final digest; emitted exactly once, last.
    Done { hash: ContentHash },
    /// Hashing failed; emitted instead of `Done`.
    Failed { error: String },
}

/// Hashes `path` on the blocking pool, emitting progress events.
///
/// Hashing a large file is CPU- and disk-bound, so it runs off the async
/// worker threads. The returned channel yields `Progress` events as windows
/// are consumed, then exactly one `Done` (or `Failed`). Dropping the
/// receiver aborts nothing but discards further events.
pub fn spawn_hash(path: PathBuf) -> mpsc::Receiver<HashEvent> {
    let (tx, rx) = mpsc::channel(32);

    tokio::task::spawn_blocking(move || {
        let result = hash_with_progress(&path, |percent| {
            let _ = tx.blocking_send(HashEvent::Progress { percent });
        });
        let final_event = match result {
            Ok(hash) => HashEvent::Done { hash },
            Err(e) => HashEvent::Failed {
                error: e.to_string(),
            },
        };
        let _ = tx.blocking_send(final_event);
    });

    rx
}

fn hash_with_progress(
    path: &Path,
    mut on_progress: impl FnMut(f64),
) -> Result<ContentHash, TransferError> {
    let mut file = File::open(path)?;
    let total = file.metadata()?.len();
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_WINDOW_SIZE];
    let mut consumed: u64 = 0;

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        consumed += n as u64;
        if total > 0 {
            on_progress(consumed as f64 / total as f64 * 100.0);
        }
    }

    ContentHash::new(hex::encode(hasher.finalize()))
        .map_err(|e| TransferError::HashFailed(e.to_string()))
}
