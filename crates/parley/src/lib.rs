//! parley - chat protocol types for the tally agent
//!
//! Two parties exchange [`ChatMessage`]s and confirm receipt with
//! [`ChatAcknowledgement`]s. Both travel inside an [`Envelope`] that names the
//! remote peer: the sender on the way in, the recipient on the way out.
//!
//! Addressing, signing and mailbox delivery belong to whatever transport
//! carries the envelopes. This crate only defines the shapes and a JSON-lines
//! codec for them.
//!
//! ## Wire format
//!
//! ```json
//! {"peer":"agent1qexample","message":{"kind":"chat","msg_id":"…","timestamp":"…",
//!   "content":[{"type":"session-start"},{"type":"text","text":"What's my balance?"}]}}
//! {"peer":"agent1qexample","message":{"kind":"ack","acknowledged_msg_id":"…","timestamp":"…"}}
//! ```

pub mod codec;
pub mod types;

pub use codec::ProtocolError;
pub use types::{
    Address, ChatAcknowledgement, ChatMessage, ContentItem, Envelope, MessageId, ProtocolMessage,
};
