//! WebSocket client connection to a depot.
//!
//! Implements the request/response pattern with UUID correlation: every
//! outgoing request (text or binary chunk frame) carries an id, and the
//! read pump routes the depot's reply back to the waiting caller.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use chunkferry_protocol::constants::{
    MessageType, WS_BINARY_REQUEST_TIMEOUT, WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD,
    WS_REQUEST_TIMEOUT,
};
use chunkferry_protocol::envelope::Message;

use crate::UploaderError;

/// Abstraction over the transport to the depot.
///
/// Lets the upload flow run against a mock in tests. Methods return boxed
/// futures so the trait stays object-safe.
pub trait ServerConnection: Send + Sync {
    /// Sends a JSON request and waits for the correlated response.
    fn send_request(
        &self,
        msg_type: MessageType,
        payload: &serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<Message, UploaderError>> + Send + '_>>;

    /// Sends a binary chunk frame and waits for the correlated response.
    ///
    /// The connection injects the correlation id into `header`.
    fn send_binary(
        &self,
        header: &serde_json::Value,
        data: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<Message, UploaderError>> + Send + '_>>;
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>;

/// WebSocket connection to a depot.
pub struct WsConnection {
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: PendingMap,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
}

impl WsConnection {
    /// Connects to a depot WebSocket endpoint.
    pub async fn connect(url: &str) -> Result<Self, UploaderError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(write_pump(write, write_rx, cancel.clone()));
        let read_handle = tokio::spawn(read_pump(
            read,
            pending.clone(),
            write_tx.clone(),
            cancel.clone(),
        ));
        let ping_handle = tokio::spawn(ping_pump(write_tx.clone(), cancel.clone()));

        Ok(Self {
            write_tx,
            pending,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        })
    }

    /// Sends a request and waits for the response.
    pub async fn request(
        &self,
        msg_type: MessageType,
        payload: &serde_json::Value,
    ) -> Result<Message, UploaderError> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(&id, msg_type, Some(payload))?;
        let json = serde_json::to_string(&msg)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let sent = self
            .write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await;
        if sent.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(UploaderError::Closed);
        }

        let result = tokio::time::timeout(WS_REQUEST_TIMEOUT, rx).await;
        // Clean up the pending entry on any exit path.
        self.pending.lock().await.remove(&id);
        finish_response(result)
    }

    /// Sends a binary chunk frame and waits for the text response.
    ///
    /// Wire format: `[4 bytes big-endian header length][JSON header][data]`,
    /// with the correlation id injected into the header.
    pub async fn request_binary(
        &self,
        header: &serde_json::Value,
        data: &[u8],
    ) -> Result<Message, UploaderError> {
        let id = uuid::Uuid::new_v4().to_string();

        let mut header = header.clone();
        if let Some(obj) = header.as_object_mut() {
            obj.insert("id".into(), serde_json::Value::String(id.clone()));
        }

        let header_bytes = serde_json::to_vec(&header)?;
        let header_len = header_bytes.len() as u32;

        let mut frame = Vec::with_capacity(4 + header_bytes.len() + data.len());
        frame.extend_from_slice(&header_len.to_be_bytes());
        frame.extend_from_slice(&header_bytes);
        frame.extend_from_slice(data);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        let sent = self
            .write_tx
            .send(tungstenite::Message::Binary(frame.into()))
            .await;
        if sent.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(UploaderError::Closed);
        }

        // Chunk frames get the longer timeout: the depot does real disk I/O.
        let result = tokio::time::timeout(WS_BINARY_REQUEST_TIMEOUT, rx).await;
        self.pending.lock().await.remove(&id);
        finish_response(result)
    }

    /// Gracefully closes the connection.
    pub async fn close(&self) {
        self.cancel.cancel();
        let _ = self
            .write_tx
            .send(tungstenite::Message::Close(None))
            .await;
    }
}

impl ServerConnection for WsConnection {
    fn send_request(
        &self,
        msg_type: MessageType,
        payload: &serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<Message, UploaderError>> + Send + '_>> {
        let payload = payload.clone();
        Box::pin(async move { self.request(msg_type, &payload).await })
    }

    fn send_binary(
        &self,
        header: &serde_json::Value,
        data: &[u8],
    ) -> Pin<Box<dyn Future<Output = Result<Message, UploaderError>> + Send + '_>> {
        let header = header.clone();
        let data = data.to_vec();
        Box::pin(async move { self.request_binary(&header, &data).await })
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}

/// Maps a timed-out / closed / errored response into the caller's result.
fn finish_response(
    result: Result<Result<Message, oneshot::error::RecvError>, tokio::time::error::Elapsed>,
) -> Result<Message, UploaderError> {
    match result {
        Ok(Ok(resp)) => {
            if let Some(err) = &resp.error {
                return Err(UploaderError::Depot {
                    code: err.code,
                    message: err.message.clone(),
                });
            }
            Ok(resp)
        }
        Ok(Err(_)) => Err(UploaderError::Closed),
        Err(_) => Err(UploaderError::Timeout),
    }
}

/// Write pump: drains the send channel into the sink.
async fn write_pump<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: futures_util::Sink<tungstenite::Message, Error = tungstenite::Error> + Send + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    let _ = sink.close().await;
}

/// Read pump: routes correlated responses to their waiters.
async fn read_pump<S>(
    mut stream: S,
    pending: PendingMap,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: futures_util::Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
        + Send
        + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        let msg: Message = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                tracing::error!("invalid message JSON: {e}");
                                continue;
                            }
                        };
                        let waiter = pending.lock().await.remove(&msg.id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(msg);
                            }
                            None => {
                                // Uncorrelated push event (e.g. upload_progress).
                                tracing::debug!(msg_type = ?msg.msg_type, "push event");
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        let _ = write_tx.try_send(tungstenite::Message::Pong(data));
                    }
                    Some(Ok(tungstenite::Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("read pump error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    // Wake every waiter with a closed channel.
    pending.lock().await.clear();
    cancel.cancel();
}

/// Ping pump: periodic keepalive pings.
async fn ping_pump(write_tx: mpsc::Sender<tungstenite::Message>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(WS_PING_PERIOD);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if write_tx
                    .send(tungstenite::Message::Ping(Vec::new().into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binary_frame_wire_format() {
        // Build a connection around a hand-made channel to capture the frame.
        let (write_tx, mut write_rx) = mpsc::channel::<tungstenite::Message>(16);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let conn = WsConnection {
            write_tx,
            pending: pending.clone(),
            cancel,
            _read_handle: tokio::spawn(async {}),
            _write_handle: tokio::spawn(async {}),
            _ping_handle: tokio::spawn(async {}),
        };

        let header = serde_json::json!({
            "contentHash": "a665a45920422f9d417e4867efdc4fb8a04a1f3fff1fa07e998e86f7f7a27ae3",
            "index": 4,
            "filename": "f.bin"
        });
        let data = b"chunk payload";

        let send_handle = tokio::spawn(async move {
            let _ = conn.request_binary(&header, data).await;
        });

        let frame = match write_rx.recv().await.unwrap() {
            tungstenite::Message::Binary(b) => b.to_vec(),
            other => panic!("expected binary frame, got {other:?}"),
        };

        assert!(frame.len() > 4);
        let header_len = ((frame[0] as usize) << 24)
            | ((frame[1] as usize) << 16)
            | ((frame[2] as usize) << 8)
            | (frame[3] as usize);

        let header_json: serde_json::Value =
            serde_json::from_slice(&frame[4..4 + header_len]).unwrap();
        assert_eq!(header_json["index"], 4);
        assert_eq!(header_json["filename"], "f.bin");
        // The correlation id was injected.
        assert!(header_json["id"].is_string());
        assert!(!header_json["id"].as_str().unwrap().is_empty());

        assert_eq!(&frame[4 + header_len..], b"chunk payload");

        send_handle.abort();
    }

    #[tokio::test]
    async fn request_on_closed_channel_errors() {
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(1);
        drop(write_rx);
        let conn = WsConnection {
            write_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
            _read_handle: tokio::spawn(async {}),
            _write_handle: tokio::spawn(async {}),
            _ping_handle: tokio::spawn(async {}),
        };

        let result = conn
            .request(MessageType::Ping, &serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(UploaderError::Closed)));
        // No pending entry may leak.
        assert!(conn.pending.lock().await.is_empty());
    }

    #[test]
    fn error_display() {
        assert_eq!(UploaderError::Timeout.to_string(), "request timed out");
        assert_eq!(UploaderError::Closed.to_string(), "connection closed");
        let err = UploaderError::Depot {
            code: 500,
            message: "disk full".into(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("disk full"));
    }
}
