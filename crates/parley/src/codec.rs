//! JSON-lines framing for envelopes.
//!
//! One envelope per line. Lines are trimmed before decoding so CRLF input
//! from interactive terminals works.

use thiserror::Error;

use crate::types::Envelope;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Empty frame")]
    Empty,
}

impl Envelope {
    /// Decode one line of JSON into an envelope
    pub fn from_json_line(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::Empty);
        }
        serde_json::from_str(line).map_err(ProtocolError::Decode)
    }

    /// Encode as a single line of JSON, without the trailing newline
    pub fn to_json_line(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    #[test]
    fn test_decode_chat_envelope() {
        let line = r#"{"peer":"agent1qsender","message":{"kind":"chat","msg_id":"m-1","timestamp":"2025-01-01T00:00:00Z","content":[{"type":"start-session"},{"type":"text","text":"What's the balance of tb1qexample?"}]}}"#;
        let envelope = Envelope::from_json_line(line).unwrap();

        assert_eq!(envelope.peer, Address::new("agent1qsender"));
        match envelope.message {
            ProtocolMessage::Chat(msg) => {
                assert_eq!(msg.msg_id, MessageId("m-1".into()));
                assert_eq!(msg.content.len(), 2);
                assert_eq!(msg.content[0], ContentItem::SessionStart);
            }
            other => panic!("expected chat, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_ack_envelope_with_crlf() {
        let line = "{\"peer\":\"p\",\"message\":{\"kind\":\"ack\",\"acknowledged_msg_id\":\"m-9\",\"timestamp\":\"2025-01-01T00:00:00Z\",\"metadata\":{\"k\":\"v\"}}}\r\n";
        let envelope = Envelope::from_json_line(line).unwrap();
        match envelope.message {
            ProtocolMessage::Ack(ack) => {
                assert_eq!(ack.acknowledged_msg_id, MessageId("m-9".into()));
                assert!(ack.metadata.is_some());
            }
            other => panic!("expected ack, got {:?}", other),
        }
    }

    #[test]
    fn test_encoded_line_has_no_newline() {
        let envelope = Envelope::chat(Address::new("p"), ChatMessage::text("line one\nline two"));
        let line = envelope.to_json_line().unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(Envelope::from_json_line(&line).unwrap(), envelope);
    }

    #[test]
    fn test_blank_line_is_empty_frame() {
        assert!(matches!(Envelope::from_json_line("   "), Err(ProtocolError::Empty)));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            Envelope::from_json_line("{not json"),
            Err(ProtocolError::Decode(_))
        ));
    }
}
