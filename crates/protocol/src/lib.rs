//! Wire protocol shared by the depot (server) and courier (client) sides.
//!
//! All communication is JSON text messages in a common [`envelope::Message`]
//! plus a length-prefixed binary frame for raw chunk payloads (defined in
//! the server crate). Payload structs live in [`messages`], shared domain
//! types in [`types`], timing/size constants and [`constants::MessageType`]
//! in [`constants`].

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

pub use constants::MessageType;
pub use types::{ContentHash, InvalidHash};
