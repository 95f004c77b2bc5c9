//! Handler trait for processing client messages.
//!
//! Implementors provide the upload domain logic (verify, chunk storage,
//! merge) while the server framework handles connection management,
//! routing, and the binary frame protocol.

use std::future::Future;
use std::pin::Pin;

use chunkferry_protocol::MessageType;
use chunkferry_protocol::constants::WS_ERR_CODE_NOT_IMPLEMENTED;
use chunkferry_protocol::envelope::Message;

use crate::binary::ChunkFrameHeader;
use crate::connection::Sender;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Trait for handling messages from an upload client.
///
/// Each method receives a `sender` for replies/events and the parsed
/// message. Default implementations reply "not implemented" so handlers
/// only override what they support.
pub trait Handler: Send + Sync + 'static {
    /// Called for `verify`: "what do you already hold for this hash?"
    fn on_verify(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender.send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for `upload_chunk` (JSON body with base64 data — large
    /// chunks arrive through [`on_binary_chunk`](Handler::on_binary_chunk)).
    fn on_upload_chunk(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender.send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for `merge`.
    fn on_merge(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let _ = sender.send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented");
        })
    }

    /// Called for `ping` messages.
    fn on_ping(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            if let Ok(reply) = msg.reply(MessageType::Pong, Option::<&()>::None) {
                let _ = sender.send_msg(reply);
            }
        })
    }

    /// Called for a binary chunk frame.
    fn on_binary_chunk(
        &self,
        sender: Sender,
        header: ChunkFrameHeader,
        data: Vec<u8>,
    ) -> HandlerFuture<'_> {
        let _ = data;
        Box::pin(async move {
            let _ = sender.send_error_id(
                &header.id,
                WS_ERR_CODE_NOT_IMPLEMENTED,
                "not implemented",
            );
        })
    }

    /// Called when a client disconnects (cleanup hook).
    fn on_client_disconnected(&self) -> HandlerFuture<'_> {
        Box::pin(async {})
    }
}
