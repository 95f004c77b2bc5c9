//! Handler implementation for the depot server.
//!
//! `DepotHandler` implements the server `Handler` trait, mapping wire
//! messages onto [`UploadSession`] operations and store errors back onto
//! wire statuses.

use chunkferry_protocol::MessageType;
use chunkferry_protocol::constants::{WS_ERR_CODE_BAD_REQUEST, WS_ERR_CODE_INTERNAL};
use chunkferry_protocol::envelope::Message;
use chunkferry_protocol::messages::{
    ChunkResponse, MergeRequest, MergeResponse, UploadChunkRequest, UploadProgressEvent,
    VerifyRequest, VerifyResponse,
};
use chunkferry_protocol::types::{ChunkStatus, ContentHash, MergeStatus};
use chunkferry_server::{ChunkFrameHeader, Handler, HandlerFuture, Sender};
use chunkferry_store::{ChunkAck, StoreError, UploadSession, UploadState};
use chunkferry_transfer::checksum_bytes;

pub struct DepotHandler {
    session: UploadSession,
}

impl DepotHandler {
    pub fn new(session: UploadSession) -> Self {
        Self { session }
    }

    /// Shared chunk-acceptance path for binary frames and JSON chunks.
    ///
    /// Returns the wire status, or an error string when the chunk must be
    /// rejected without touching storage.
    async fn accept_chunk(
        &self,
        hash: &ContentHash,
        filename: &str,
        index: u32,
        checksum: &str,
        data: &[u8],
    ) -> Result<ChunkStatus, ChunkReject> {
        if !checksum.is_empty() && checksum_bytes(data) != checksum {
            return Err(ChunkReject::Client("chunk checksum mismatch".into()));
        }

        let ack = self
            .session
            .receive_chunk(hash, filename, index, data)
            .await
            .map_err(|e| ChunkReject::Internal(e.to_string()))?;

        Ok(match ack {
            ChunkAck::Stored => ChunkStatus::Ok,
            ChunkAck::AlreadyStored => ChunkStatus::AlreadyExists,
            ChunkAck::FileComplete => ChunkStatus::FileComplete,
        })
    }

    /// Push a progress event after a freshly stored chunk. Best-effort.
    async fn push_progress(&self, sender: &Sender, hash: &ContentHash, index: u32) {
        let stored_count = match self.session.store().list(hash).await {
            Ok(stored) => stored.len() as u32,
            Err(_) => return,
        };
        let event = UploadProgressEvent {
            content_hash: hash.clone(),
            index,
            stored_count,
        };
        if let Ok(msg) = Message::new(
            format!("progress-{hash}-{index}"),
            MessageType::UploadProgress,
            Some(&event),
        ) {
            let _ = sender.send_msg(msg);
        }
    }
}

enum ChunkReject {
    Client(String),
    Internal(String),
}

impl Handler for DepotHandler {
    fn on_verify(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let req: VerifyRequest = match msg.parse_payload() {
                Ok(Some(req)) => req,
                _ => {
                    let _ = sender.send_error(&msg, WS_ERR_CODE_BAD_REQUEST, "invalid verify payload");
                    return;
                }
            };

            let resp = match self.session.verify(&req.content_hash, &req.filename).await {
                Ok(UploadState::Complete) => VerifyResponse {
                    is_uploaded: true,
                    uploaded_list: vec![],
                },
                Ok(UploadState::Partial { stored }) => VerifyResponse {
                    is_uploaded: false,
                    uploaded_list: stored.into_iter().collect(),
                },
                Err(e) => {
                    tracing::error!(hash = %req.content_hash, "verify failed: {e}");
                    let _ = sender.send_error(&msg, WS_ERR_CODE_INTERNAL, &e.to_string());
                    return;
                }
            };

            if let Ok(reply) = msg.reply(MessageType::VerifyResponse, Some(&resp)) {
                let _ = sender.send_msg(reply);
            }
        })
    }

    fn on_binary_chunk(
        &self,
        sender: Sender,
        header: ChunkFrameHeader,
        data: Vec<u8>,
    ) -> HandlerFuture<'_> {
        Box::pin(async move {
            let status = match self
                .accept_chunk(
                    &header.content_hash,
                    &header.filename,
                    header.index,
                    &header.checksum,
                    &data,
                )
                .await
            {
                Ok(status) => status,
                Err(ChunkReject::Client(reason)) => {
                    let _ = sender.send_error_id(&header.id, WS_ERR_CODE_BAD_REQUEST, &reason);
                    return;
                }
                Err(ChunkReject::Internal(reason)) => {
                    tracing::error!(hash = %header.content_hash, index = header.index, "chunk store failed: {reason}");
                    let _ = sender.send_error_id(&header.id, WS_ERR_CODE_INTERNAL, &reason);
                    return;
                }
            };

            if status == ChunkStatus::Ok {
                self.push_progress(&sender, &header.content_hash, header.index)
                    .await;
            }

            let resp = ChunkResponse { status };
            if let Ok(reply) = Message::new(&header.id, MessageType::ChunkResponse, Some(&resp)) {
                let _ = sender.send_msg(reply);
            }
        })
    }

    fn on_upload_chunk(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let req: UploadChunkRequest = match msg.parse_payload() {
                Ok(Some(req)) => req,
                _ => {
                    let _ = sender.send_error(&msg, WS_ERR_CODE_BAD_REQUEST, "invalid chunk payload");
                    return;
                }
            };

            let status = match self
                .accept_chunk(
                    &req.content_hash,
                    &req.filename,
                    req.index,
                    &req.checksum,
                    &req.data,
                )
                .await
            {
                Ok(status) => status,
                Err(ChunkReject::Client(reason)) => {
                    let _ = sender.send_error(&msg, WS_ERR_CODE_BAD_REQUEST, &reason);
                    return;
                }
                Err(ChunkReject::Internal(reason)) => {
                    let _ = sender.send_error(&msg, WS_ERR_CODE_INTERNAL, &reason);
                    return;
                }
            };

            if status == ChunkStatus::Ok {
                self.push_progress(&sender, &req.content_hash, req.index).await;
            }

            let resp = ChunkResponse { status };
            if let Ok(reply) = msg.reply(MessageType::ChunkResponse, Some(&resp)) {
                let _ = sender.send_msg(reply);
            }
        })
    }

    fn on_merge(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let req: MergeRequest = match msg.parse_payload() {
                Ok(Some(req)) => req,
                _ => {
                    let _ = sender.send_error(&msg, WS_ERR_CODE_BAD_REQUEST, "invalid merge payload");
                    return;
                }
            };

            let resp = match self
                .session
                .merge(&req.content_hash, &req.filename, req.chunk_size, req.total_chunks)
                .await
            {
                Ok(report) => MergeResponse {
                    status: MergeStatus::Ok,
                    message: format!("merged {} chunk(s)", report.chunks),
                    missing: vec![],
                },
                Err(StoreError::IncompleteUpload { missing }) => MergeResponse {
                    status: MergeStatus::Incomplete,
                    message: format!("{} chunk(s) missing", missing.len()),
                    missing,
                },
                Err(e @ (StoreError::InvalidChunkSize
                | StoreError::InvalidChunkCount
                | StoreError::ChunkSizeMismatch { .. }
                | StoreError::DigestMismatch { .. })) => {
                    let _ = sender.send_error(&msg, WS_ERR_CODE_BAD_REQUEST, &e.to_string());
                    return;
                }
                Err(e) => {
                    tracing::error!(hash = %req.content_hash, "merge failed: {e}");
                    let _ = sender.send_error(&msg, WS_ERR_CODE_INTERNAL, &e.to_string());
                    return;
                }
            };

            if let Ok(reply) = msg.reply(MessageType::MergeResponse, Some(&resp)) {
                let _ = sender.send_msg(reply);
            }
        })
    }
}
