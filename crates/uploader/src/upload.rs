//! Upload orchestration: hash → verify → send missing chunks → merge.

use std::collections::BTreeSet;
use std::path::Path;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chunkferry_protocol::MessageType;
use chunkferry_protocol::envelope::Message;
use chunkferry_protocol::messages::{ChunkResponse, MergeRequest, MergeResponse, VerifyRequest, VerifyResponse};
use chunkferry_protocol::types::{ChunkStatus, ContentHash, MergeStatus};
use chunkferry_transfer::{ChunkReader, DEFAULT_CHUNK_SIZE, HashEvent, spawn_hash};

use crate::UploaderError;
use crate::connection::ServerConnection;

/// Progress events emitted during an upload.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Whole-file hashing progress, 0–100.
    Hashing { percent: f64 },
    /// The content hash is known; the upload is now resumable under it.
    Hashed { hash: ContentHash },
    /// Depot answered verify. `stored` counts chunks it already holds.
    Verified { already_complete: bool, stored: usize },
    /// One chunk acknowledged.
    ChunkSent { index: u32, status: ChunkStatus },
    /// Final file assembled on the depot.
    Merged,
    /// Flow finished successfully.
    Completed,
    /// Flow failed.
    Failed { error: String },
}

/// Result of a completed upload flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The depot already had the file; no bytes moved.
    AlreadyUploaded { hash: ContentHash },
    /// Chunks were transferred and merged.
    Uploaded {
        hash: ContentHash,
        chunks_sent: u32,
        bytes_sent: u64,
    },
}

/// Drives resumable uploads, emitting progress events and supporting
/// cancellation between chunks.
pub struct Uploader {
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

impl Default for Uploader {
    fn default() -> Self {
        Self::new()
    }
}

impl Uploader {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Returns a cancellation token for this upload.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads `path` to the depot behind `conn`.
    ///
    /// `chunk_size = 0` uses [`DEFAULT_CHUNK_SIZE`]. The flow is resumable:
    /// run it again after a crash and only the missing chunks move.
    pub async fn upload(
        &self,
        conn: &dyn ServerConnection,
        path: &Path,
        chunk_size: u64,
    ) -> Result<UploadOutcome, UploaderError> {
        match self.run(conn, path, chunk_size).await {
            Ok(outcome) => {
                let _ = self.events_tx.send(UploadEvent::Completed).await;
                info!(path = %path.display(), "upload completed");
                Ok(outcome)
            }
            Err(e) => {
                let _ = self
                    .events_tx
                    .send(UploadEvent::Failed {
                        error: e.to_string(),
                    })
                    .await;
                error!(path = %path.display(), error = %e, "upload failed");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        conn: &dyn ServerConnection,
        path: &Path,
        chunk_size: u64,
    ) -> Result<UploadOutcome, UploaderError> {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        // Hash first: identity before any bytes move.
        let hash = self.hash_with_events(path).await?;
        let _ = self
            .events_tx
            .send(UploadEvent::Hashed { hash: hash.clone() })
            .await;

        // Ask the depot what it already holds.
        let verify = VerifyRequest {
            filename: filename.clone(),
            content_hash: hash.clone(),
        };
        let resp = conn
            .send_request(MessageType::Verify, &serde_json::to_value(&verify)?)
            .await?;
        let verify_resp: VerifyResponse = parse_response(&resp, MessageType::VerifyResponse)?;

        if verify_resp.is_uploaded {
            let _ = self
                .events_tx
                .send(UploadEvent::Verified {
                    already_complete: true,
                    stored: 0,
                })
                .await;
            return Ok(UploadOutcome::AlreadyUploaded { hash });
        }

        let stored: BTreeSet<u32> = verify_resp.uploaded_list.iter().copied().collect();
        let _ = self
            .events_tx
            .send(UploadEvent::Verified {
                already_complete: false,
                stored: stored.len(),
            })
            .await;

        // Send only what the depot is missing.
        let mut reader = ChunkReader::new(path, chunk_size)?;
        let total_chunks = reader.chunk_count();
        let mut chunks_sent: u32 = 0;
        let mut bytes_sent: u64 = 0;

        for index in 0..total_chunks {
            if stored.contains(&index) {
                continue;
            }
            if self.cancel.is_cancelled() {
                return Err(UploaderError::Cancelled);
            }

            let chunk = reader.chunk_at(index)?;
            let header = serde_json::json!({
                "contentHash": hash,
                "index": chunk.index,
                "filename": filename,
                "checksum": chunk.checksum,
            });
            let resp = conn.send_binary(&header, &chunk.data).await?;
            let ack: ChunkResponse = parse_response(&resp, MessageType::ChunkResponse)?;

            let _ = self
                .events_tx
                .send(UploadEvent::ChunkSent {
                    index,
                    status: ack.status,
                })
                .await;

            if ack.status == ChunkStatus::FileComplete {
                // Depot finished this content while we were sending
                // (another client got there first). Nothing left to do.
                return Ok(UploadOutcome::AlreadyUploaded { hash });
            }
            chunks_sent += 1;
            bytes_sent += chunk.data.len() as u64;
        }

        // Merge with the expected count so a gap fails fast on the depot.
        let merge = MergeRequest {
            filename,
            content_hash: hash.clone(),
            chunk_size,
            total_chunks,
        };
        let resp = conn
            .send_request(MessageType::Merge, &serde_json::to_value(&merge)?)
            .await?;
        let merge_resp: MergeResponse = parse_response(&resp, MessageType::MergeResponse)?;
        if merge_resp.status == MergeStatus::Incomplete {
            return Err(UploaderError::Incomplete {
                missing: merge_resp.missing,
            });
        }
        let _ = self.events_tx.send(UploadEvent::Merged).await;

        Ok(UploadOutcome::Uploaded {
            hash,
            chunks_sent,
            bytes_sent,
        })
    }

    /// Runs the background hasher, forwarding progress events.
    async fn hash_with_events(&self, path: &Path) -> Result<ContentHash, UploaderError> {
        let mut rx = spawn_hash(path.to_path_buf());
        let mut result = None;
        while let Some(event) = rx.recv().await {
            match event {
                HashEvent::Progress { percent } => {
                    let _ = self.events_tx.send(UploadEvent::Hashing { percent }).await;
                }
                HashEvent::Done { hash } => result = Some(Ok(hash)),
                HashEvent::Failed { error } => result = Some(Err(UploaderError::Hash(error))),
            }
        }
        result.unwrap_or(Err(UploaderError::Hash("hasher produced no result".into())))
    }
}

/// Checks the reply type and extracts its payload.
fn parse_response<T: for<'de> serde::Deserialize<'de>>(
    msg: &Message,
    expected: MessageType,
) -> Result<T, UploaderError> {
    if msg.msg_type != expected {
        return Err(UploaderError::UnexpectedResponse(format!(
            "expected {expected:?}, got {:?}",
            msg.msg_type
        )));
    }
    msg.parse_payload()?
        .ok_or_else(|| UploaderError::UnexpectedResponse("response payload missing".into()))
}
