//! Frame envelope: the outermost layer of every wire message.
//!
//! Layout, mirroring the gateway's observed tags:
//!
//! ```text
//! notification: [0x01][name: varint len + bytes][payload...]
//! request:      [0x02][id: u32 LE][name: varint len + bytes][payload...]
//! response:     [0x03][id: u32 LE][payload...]
//! ```
//!
//! The envelope carries the payload as raw bytes. Responses name no method,
//! so only the layer that issued the request (and remembers its method path)
//! can decode them.

use crate::wire::{put_delimited, read_delimited, take};
use crate::ProtocolError;

const KIND_NOTIFICATION: u8 = 1;
const KIND_REQUEST: u8 = 2;
const KIND_RESPONSE: u8 = 3;

/// What a frame is: request, response, or unsolicited notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    /// Unsolicited server push. Carries a message name, no id.
    Notification,
    /// A call. Carries a correlation id and a `Service.method` path.
    Request,
    /// The reply to a call. Carries the correlation id only.
    Response,
}

/// A decoded frame envelope. Transient; constructed per message.
#[derive(Debug, Clone)]
pub struct WireMessage {
    /// The frame's kind tag.
    pub kind: WireKind,
    /// Correlation id, present for requests and responses.
    pub id: Option<u32>,
    /// `Service.method` path (requests) or message name (notifications).
    pub name: Option<String>,
    /// Undecoded payload bytes.
    pub payload: Vec<u8>,
}

impl WireMessage {
    /// Splits raw frame bytes into an envelope without touching the payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut input = bytes;
        let kind = *input.first().ok_or_else(|| {
            ProtocolError::MalformedMessage("empty frame".into())
        })?;
        input = &input[1..];

        match kind {
            KIND_NOTIFICATION => {
                let name = read_name(&mut input)?;
                Ok(Self {
                    kind: WireKind::Notification,
                    id: None,
                    name: Some(name),
                    payload: input.to_vec(),
                })
            }
            KIND_REQUEST => {
                let id = read_id(&mut input)?;
                let name = read_name(&mut input)?;
                Ok(Self {
                    kind: WireKind::Request,
                    id: Some(id),
                    name: Some(name),
                    payload: input.to_vec(),
                })
            }
            KIND_RESPONSE => {
                let id = read_id(&mut input)?;
                Ok(Self {
                    kind: WireKind::Response,
                    id: Some(id),
                    name: None,
                    payload: input.to_vec(),
                })
            }
            other => Err(ProtocolError::MalformedMessage(format!(
                "unknown frame kind {other:#04x}"
            ))),
        }
    }
}

/// Assembles a request frame.
pub(crate) fn frame_request(id: u32, path: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + path.len() + 8);
    out.push(KIND_REQUEST);
    out.extend_from_slice(&id.to_le_bytes());
    put_delimited(&mut out, path.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Assembles a response frame.
pub(crate) fn frame_response(id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 5);
    out.push(KIND_RESPONSE);
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Assembles a notification frame.
pub(crate) fn frame_notification(name: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + name.len() + 4);
    out.push(KIND_NOTIFICATION);
    put_delimited(&mut out, name.as_bytes());
    out.extend_from_slice(payload);
    out
}

fn read_id(input: &mut &[u8]) -> Result<u32, ProtocolError> {
    let bytes = take(input, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_name(input: &mut &[u8]) -> Result<String, ProtocolError> {
    let bytes = read_delimited(input)?;
    String::from_utf8(bytes).map_err(|_| {
        ProtocolError::MalformedMessage("frame name is not UTF-8".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_frame_round_trips() {
        let frame = frame_request(7, "Lobby.heatbeat", &[0xde, 0xad]);
        let msg = WireMessage::decode(&frame).unwrap();
        assert_eq!(msg.kind, WireKind::Request);
        assert_eq!(msg.id, Some(7));
        assert_eq!(msg.name.as_deref(), Some("Lobby.heatbeat"));
        assert_eq!(msg.payload, vec![0xde, 0xad]);
    }

    #[test]
    fn response_frame_round_trips() {
        let frame = frame_response(u32::MAX, &[1, 2, 3]);
        let msg = WireMessage::decode(&frame).unwrap();
        assert_eq!(msg.kind, WireKind::Response);
        assert_eq!(msg.id, Some(u32::MAX));
        assert!(msg.name.is_none());
        assert_eq!(msg.payload, vec![1, 2, 3]);
    }

    #[test]
    fn notification_frame_round_trips() {
        let frame = frame_notification("NotifyCustomContestSystemMsg", &[]);
        let msg = WireMessage::decode(&frame).unwrap();
        assert_eq!(msg.kind, WireKind::Notification);
        assert!(msg.id.is_none());
        assert_eq!(
            msg.name.as_deref(),
            Some("NotifyCustomContestSystemMsg")
        );
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn empty_frame_is_malformed() {
        assert!(matches!(
            WireMessage::decode(&[]),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn unknown_kind_is_malformed() {
        assert!(matches!(
            WireMessage::decode(&[0x09, 0, 0]),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn truncated_request_id_is_malformed() {
        assert!(matches!(
            WireMessage::decode(&[0x02, 0x01, 0x02]),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }
}
