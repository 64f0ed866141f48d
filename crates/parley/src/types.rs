use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a chat message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque peer address, supplied by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One item of message content.
///
/// Handlers match exhaustively, so adding a variant is a compile error
/// everywhere content is classified. Item types this crate does not model
/// (`resource`, `metadata`, ...) decode as [`ContentItem::Unknown`] so the
/// rest of the message still gets through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ContentItem {
    /// Peer opened a session. Informational only.
    #[serde(alias = "start-session")]
    SessionStart,

    /// Peer closed a session. Informational only.
    #[serde(alias = "session-end")]
    EndSession,

    /// Free-form text
    Text { text: String },

    /// Any other item type; its fields are discarded
    #[serde(other)]
    Unknown,
}

impl ContentItem {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { text: body.into() }
    }
}

/// A chat message, inbound or outbound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub msg_id: MessageId,
    pub timestamp: DateTime<Utc>,
    pub content: Vec<ContentItem>,
}

impl ChatMessage {
    /// New message with a fresh id, stamped now
    pub fn new(content: Vec<ContentItem>) -> Self {
        Self {
            msg_id: MessageId::new(),
            timestamp: Utc::now(),
            content,
        }
    }

    /// Single text item reply
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(vec![ContentItem::text(body)])
    }

    /// Bodies of all text items, in order
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|item| match item {
            ContentItem::Text { text } => Some(text.as_str()),
            ContentItem::SessionStart | ContentItem::EndSession | ContentItem::Unknown => None,
        })
    }
}

/// Receipt for a chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAcknowledgement {
    pub acknowledged_msg_id: MessageId,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl ChatAcknowledgement {
    pub fn for_message(msg_id: &MessageId) -> Self {
        Self {
            acknowledged_msg_id: msg_id.clone(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Everything that can travel between the two parties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolMessage {
    Chat(ChatMessage),
    Ack(ChatAcknowledgement),
}

/// A protocol message addressed to or from a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender for inbound envelopes, recipient for outbound ones
    pub peer: Address,
    pub message: ProtocolMessage,
}

impl Envelope {
    pub fn chat(peer: Address, message: ChatMessage) -> Self {
        Self {
            peer,
            message: ProtocolMessage::Chat(message),
        }
    }

    pub fn ack(peer: Address, ack: ChatAcknowledgement) -> Self {
        Self {
            peer,
            message: ProtocolMessage::Ack(ack),
        }
    }
}
