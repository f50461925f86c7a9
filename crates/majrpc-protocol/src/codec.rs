//! Schema-driven payload codec.
//!
//! Payloads travel as a compact tagged binary form: `[tag u8][value]` per
//! present field, with varints for integers and varint-length-delimited
//! runs for strings, bytes, and nested messages. The schema supplies the
//! shape; callers work in `serde_json::Value` terms and address shapes by
//! `Service.method` path or message name.
//!
//! The codec holds no per-call state. Cloning is cheap (one `Arc`), and a
//! single instance can be shared across every task on a connection.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::frame::{frame_notification, frame_request, frame_response};
use crate::wire::{
    put_delimited, put_uvarint, read_delimited, read_uvarint, take, unzigzag,
    zigzag,
};
use crate::{FieldDef, FieldKind, MessageDef, ProtocolError, ProtocolSchema};

/// Encodes outgoing calls and decodes inbound payloads against a
/// [`ProtocolSchema`].
#[derive(Debug, Clone)]
pub struct MessageCodec {
    schema: Arc<ProtocolSchema>,
}

impl MessageCodec {
    /// Creates a codec over a shared schema.
    pub fn new(schema: Arc<ProtocolSchema>) -> Self {
        Self { schema }
    }

    /// The schema this codec resolves names against.
    pub fn schema(&self) -> &ProtocolSchema {
        &self.schema
    }

    /// Encodes a complete request frame for `Service.method`.
    pub fn encode_request(
        &self,
        id: u32,
        service: &str,
        method: &str,
        args: &Value,
    ) -> Result<Vec<u8>, ProtocolError> {
        let def = self.schema.method(service, method)?;
        let payload = self.encode_message(&def.request, args)?;
        Ok(frame_request(id, &format!("{service}.{method}"), &payload))
    }

    /// Encodes a complete response frame for `Service.method`.
    ///
    /// The client never sends responses; this exists for loopback servers
    /// in tests and keeps encode/decode symmetric.
    pub fn encode_response(
        &self,
        id: u32,
        service: &str,
        method: &str,
        value: &Value,
    ) -> Result<Vec<u8>, ProtocolError> {
        let def = self.schema.method(service, method)?;
        let payload = self.encode_message(&def.response, value)?;
        Ok(frame_response(id, &payload))
    }

    /// Encodes a complete notification frame for a named message.
    pub fn encode_notification(
        &self,
        name: &str,
        value: &Value,
    ) -> Result<Vec<u8>, ProtocolError> {
        let payload = self.encode_message(name, value)?;
        Ok(frame_notification(name, &payload))
    }

    /// Decodes a response payload using the method's response shape.
    pub fn decode_response(
        &self,
        service: &str,
        method: &str,
        payload: &[u8],
    ) -> Result<Value, ProtocolError> {
        let def = self.schema.method(service, method)?;
        self.decode_message(&def.response, payload)
    }

    /// Decodes a notification payload by its message name.
    pub fn decode_notification(
        &self,
        name: &str,
        payload: &[u8],
    ) -> Result<Value, ProtocolError> {
        self.decode_message(name, payload)
    }

    /// Encodes a value against a named message shape.
    pub fn encode_message(
        &self,
        name: &str,
        value: &Value,
    ) -> Result<Vec<u8>, ProtocolError> {
        let def = self.schema.message(name)?;
        let mut out = Vec::new();
        self.encode_fields(def, value, &mut out)?;
        Ok(out)
    }

    /// Decodes bytes against a named message shape.
    pub fn decode_message(
        &self,
        name: &str,
        payload: &[u8],
    ) -> Result<Value, ProtocolError> {
        let def = self.schema.message(name)?;
        let mut input = payload;
        self.decode_fields(def, &mut input)
    }

    /// Encodes a name-prefixed record: `[name varint len + bytes][payload]`.
    ///
    /// Game records nest such records inside `bytes` fields.
    pub fn encode_wrapped(
        &self,
        name: &str,
        value: &Value,
    ) -> Result<Vec<u8>, ProtocolError> {
        let payload = self.encode_message(name, value)?;
        let mut out = Vec::with_capacity(name.len() + payload.len() + 2);
        put_delimited(&mut out, name.as_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decodes a name-prefixed record, returning the name and its value.
    pub fn decode_wrapped(
        &self,
        bytes: &[u8],
    ) -> Result<(String, Value), ProtocolError> {
        let mut input = bytes;
        let name = String::from_utf8(read_delimited(&mut input)?).map_err(
            |_| ProtocolError::MalformedMessage("record name is not UTF-8".into()),
        )?;
        let value = self.decode_message(&name, input)?;
        Ok((name, value))
    }

    fn encode_fields(
        &self,
        def: &MessageDef,
        value: &Value,
        out: &mut Vec<u8>,
    ) -> Result<(), ProtocolError> {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::Null => return Ok(()),
            _ => {
                return Err(ProtocolError::TypeMismatch {
                    field: "<message>".into(),
                    expected: "object",
                })
            }
        };
        // Absent and null fields are simply not written; unknown keys in the
        // input are ignored, matching the source schema's forward-compat rules.
        for field in &def.fields {
            let Some(v) = obj.get(&field.name) else { continue };
            if v.is_null() {
                continue;
            }
            out.push(field.tag);
            if field.repeated {
                let items = v.as_array().ok_or_else(|| {
                    ProtocolError::TypeMismatch {
                        field: field.name.clone(),
                        expected: "array",
                    }
                })?;
                put_uvarint(out, items.len() as u64);
                for item in items {
                    self.encode_value(field, item, out)?;
                }
            } else {
                self.encode_value(field, v, out)?;
            }
        }
        Ok(())
    }

    fn encode_value(
        &self,
        field: &FieldDef,
        v: &Value,
        out: &mut Vec<u8>,
    ) -> Result<(), ProtocolError> {
        let mismatch = |expected: &'static str| ProtocolError::TypeMismatch {
            field: field.name.clone(),
            expected,
        };
        match field.kind {
            FieldKind::Uint => {
                let n = v.as_u64().ok_or_else(|| mismatch("uint"))?;
                put_uvarint(out, n);
            }
            FieldKind::Int => {
                let n = v.as_i64().ok_or_else(|| mismatch("int"))?;
                put_uvarint(out, zigzag(n));
            }
            FieldKind::Bool => {
                let b = v.as_bool().ok_or_else(|| mismatch("bool"))?;
                out.push(u8::from(b));
            }
            FieldKind::String => {
                let s = v.as_str().ok_or_else(|| mismatch("string"))?;
                put_delimited(out, s.as_bytes());
            }
            FieldKind::Bytes => {
                let bytes = value_to_bytes(v).ok_or_else(|| mismatch("byte array"))?;
                put_delimited(out, &bytes);
            }
            FieldKind::Message => {
                let name = field.message.as_deref().unwrap_or("");
                let nested = self.encode_message(name, v)?;
                put_delimited(out, &nested);
            }
        }
        Ok(())
    }

    fn decode_fields(
        &self,
        def: &MessageDef,
        input: &mut &[u8],
    ) -> Result<Value, ProtocolError> {
        let mut map = Map::new();
        while !input.is_empty() {
            let (&tag, rest) = input.split_first().ok_or_else(|| {
                ProtocolError::MalformedMessage("truncated field tag".into())
            })?;
            *input = rest;
            let field = def.fields.iter().find(|f| f.tag == tag).ok_or_else(
                || {
                    ProtocolError::MalformedMessage(format!(
                        "unknown field tag {tag}"
                    ))
                },
            )?;
            let value = if field.repeated {
                let count = read_uvarint(input)?;
                let mut items = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    items.push(self.decode_value(field, input)?);
                }
                Value::Array(items)
            } else {
                self.decode_value(field, input)?
            };
            map.insert(field.name.clone(), value);
        }
        Ok(Value::Object(map))
    }

    fn decode_value(
        &self,
        field: &FieldDef,
        input: &mut &[u8],
    ) -> Result<Value, ProtocolError> {
        Ok(match field.kind {
            FieldKind::Uint => Value::from(read_uvarint(input)?),
            FieldKind::Int => Value::from(unzigzag(read_uvarint(input)?)),
            FieldKind::Bool => {
                let byte = take(input, 1)?[0];
                match byte {
                    0 => Value::Bool(false),
                    1 => Value::Bool(true),
                    other => {
                        return Err(ProtocolError::MalformedMessage(format!(
                            "invalid bool byte {other}"
                        )))
                    }
                }
            }
            FieldKind::String => {
                let bytes = read_delimited(input)?;
                Value::String(String::from_utf8(bytes).map_err(|_| {
                    ProtocolError::MalformedMessage(format!(
                        "field `{}` is not UTF-8",
                        field.name
                    ))
                })?)
            }
            FieldKind::Bytes => bytes_to_value(&read_delimited(input)?),
            FieldKind::Message => {
                let nested = read_delimited(input)?;
                let name = field.message.as_deref().unwrap_or("");
                self.decode_message(name, &nested)?
            }
        })
    }
}

/// Converts a JSON number array back to raw bytes.
pub fn value_to_bytes(v: &Value) -> Option<Vec<u8>> {
    v.as_array()?
        .iter()
        .map(|n| n.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

/// Represents raw bytes as a JSON number array.
pub fn bytes_to_value(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|&b| Value::from(b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{WireKind, WireMessage};
    use serde_json::json;

    fn schema() -> Arc<ProtocolSchema> {
        Arc::new(
            ProtocolSchema::from_value(json!({
                "messages": {
                    "ReqHeatBeat": { "fields": [
                        { "name": "no_operation_counter", "tag": 1, "type": "uint" }
                    ]},
                    "ResCommon": { "fields": [
                        { "name": "error", "tag": 1, "type": "message", "message": "Error" }
                    ]},
                    "Error": { "fields": [
                        { "name": "code", "tag": 1, "type": "uint" },
                        { "name": "message", "tag": 2, "type": "string" }
                    ]},
                    "NotifyRoomMessage": { "fields": [
                        { "name": "unique_id", "tag": 1, "type": "uint" },
                        { "name": "content", "tag": 2, "type": "string" },
                        { "name": "urgent", "tag": 3, "type": "bool" },
                        { "name": "offsets", "tag": 4, "type": "int", "repeated": true },
                        { "name": "blob", "tag": 5, "type": "bytes" }
                    ]}
                },
                "services": {
                    "Lobby": { "methods": {
                        "heatbeat": { "request": "ReqHeatBeat", "response": "ResCommon" }
                    }}
                }
            }))
            .unwrap(),
        )
    }

    #[test]
    fn message_round_trips_every_field_kind() {
        let codec = MessageCodec::new(schema());
        let value = json!({
            "unique_id": 113331,
            "content": "東風戦",
            "urgent": true,
            "offsets": [-3, 0, 42],
            "blob": [0, 255, 7]
        });
        let bytes = codec.encode_message("NotifyRoomMessage", &value).unwrap();
        let back = codec.decode_message("NotifyRoomMessage", &bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn absent_fields_stay_absent() {
        let codec = MessageCodec::new(schema());
        let value = json!({ "unique_id": 5 });
        let bytes = codec.encode_message("NotifyRoomMessage", &value).unwrap();
        let back = codec.decode_message("NotifyRoomMessage", &bytes).unwrap();
        assert_eq!(back, value);
        assert!(back.get("content").is_none());
    }

    #[test]
    fn null_fields_are_skipped() {
        let codec = MessageCodec::new(schema());
        let value = json!({ "unique_id": 5, "content": null });
        let bytes = codec.encode_message("NotifyRoomMessage", &value).unwrap();
        let back = codec.decode_message("NotifyRoomMessage", &bytes).unwrap();
        assert_eq!(back, json!({ "unique_id": 5 }));
    }

    #[test]
    fn nested_message_round_trips() {
        let codec = MessageCodec::new(schema());
        let value = json!({ "error": { "code": 1002, "message": "invalid token" } });
        let bytes = codec.encode_message("ResCommon", &value).unwrap();
        let back = codec.decode_message("ResCommon", &bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn request_frame_carries_method_path() {
        let codec = MessageCodec::new(schema());
        let frame = codec
            .encode_request(9, "Lobby", "heatbeat", &json!({ "no_operation_counter": 3 }))
            .unwrap();
        let msg = WireMessage::decode(&frame).unwrap();
        assert_eq!(msg.kind, WireKind::Request);
        assert_eq!(msg.id, Some(9));
        assert_eq!(msg.name.as_deref(), Some("Lobby.heatbeat"));
        let args = codec.decode_message("ReqHeatBeat", &msg.payload).unwrap();
        assert_eq!(args, json!({ "no_operation_counter": 3 }));
    }

    #[test]
    fn response_decodes_by_stored_method() {
        let codec = MessageCodec::new(schema());
        let frame = codec
            .encode_response(9, "Lobby", "heatbeat", &json!({}))
            .unwrap();
        let msg = WireMessage::decode(&frame).unwrap();
        let value = codec
            .decode_response("Lobby", "heatbeat", &msg.payload)
            .unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn notification_round_trips() {
        let codec = MessageCodec::new(schema());
        let value = json!({ "unique_id": 7, "content": "hello" });
        let frame = codec.encode_notification("NotifyRoomMessage", &value).unwrap();
        let msg = WireMessage::decode(&frame).unwrap();
        assert_eq!(msg.kind, WireKind::Notification);
        let back = codec
            .decode_notification(msg.name.as_deref().unwrap(), &msg.payload)
            .unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn unknown_method_fails_before_encoding() {
        let codec = MessageCodec::new(schema());
        let err = codec
            .encode_request(1, "Lobby", "fetchNothing", &json!({}))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::SchemaNotFound(_)));
    }

    #[test]
    fn wrong_value_shape_is_type_mismatch() {
        let codec = MessageCodec::new(schema());
        let err = codec
            .encode_message("ReqHeatBeat", &json!({ "no_operation_counter": "three" }))
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TypeMismatch { ref field, .. } if field == "no_operation_counter"
        ));
    }

    #[test]
    fn unknown_tag_is_malformed() {
        let codec = MessageCodec::new(schema());
        // tag 9 does not exist in ReqHeatBeat
        let err = codec.decode_message("ReqHeatBeat", &[9, 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedMessage(_)));
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let codec = MessageCodec::new(schema());
        let bytes = codec
            .encode_message("NotifyRoomMessage", &json!({ "content": "long enough" }))
            .unwrap();
        let err = codec
            .decode_message("NotifyRoomMessage", &bytes[..bytes.len() - 4])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedMessage(_)));
    }

    #[test]
    fn wrapped_record_round_trips() {
        let codec = MessageCodec::new(schema());
        let value = json!({ "code": 0 });
        let bytes = codec.encode_wrapped("Error", &value).unwrap();
        let (name, back) = codec.decode_wrapped(&bytes).unwrap();
        assert_eq!(name, "Error");
        assert_eq!(back, value);
    }
}
