//! Protocol schema: the externally supplied definition of message and
//! service shapes.
//!
//! The schema is fetched as a JSON document during bootstrap (outside this
//! crate) and parsed exactly once. After that it is immutable and shared
//! behind an `Arc` for the lifetime of the process.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::ProtocolError;

/// The wire type of a single message field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Unsigned varint.
    Uint,
    /// Signed varint (zigzag encoded).
    Int,
    /// Single byte, 0 or 1.
    Bool,
    /// Length-delimited UTF-8.
    String,
    /// Length-delimited raw bytes.
    Bytes,
    /// Length-delimited nested message; `FieldDef::message` names its shape.
    Message,
}

/// One field of a message shape.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    /// Field name as it appears in decoded values.
    pub name: String,
    /// Wire tag. Unique within the message.
    pub tag: u8,
    /// Wire type.
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Whether the field holds a list of values.
    #[serde(default)]
    pub repeated: bool,
    /// Target message name for `FieldKind::Message` fields.
    #[serde(default)]
    pub message: Option<String>,
}

/// An ordered list of fields making up one message shape.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDef {
    /// Fields in declaration order. Encoding walks this list; decoding
    /// looks fields up by tag.
    pub fields: Vec<FieldDef>,
}

/// One RPC method: which message shapes its request and response use.
#[derive(Debug, Clone, Deserialize)]
pub struct MethodDef {
    /// Request message name.
    pub request: String,
    /// Response message name.
    pub response: String,
}

/// A named service: a set of methods.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDef {
    /// Methods keyed by their exact wire name. These strings are external
    /// contract values and are never normalized (the gateway's heartbeat
    /// method really is spelled `heatbeat`).
    pub methods: HashMap<String, MethodDef>,
}

/// The raw schema document as it deserializes from JSON.
#[derive(Debug, Clone, Deserialize)]
struct SchemaDoc {
    messages: HashMap<String, MessageDef>,
    services: HashMap<String, ServiceDef>,
}

/// Immutable, process-lifetime-scoped protocol schema.
///
/// Resolves dotted `Service.method` paths and message names to concrete
/// shapes. All lookups fail with [`ProtocolError::SchemaNotFound`] for
/// unknown names.
#[derive(Debug, Clone)]
pub struct ProtocolSchema {
    messages: HashMap<String, MessageDef>,
    services: HashMap<String, ServiceDef>,
}

impl ProtocolSchema {
    /// Parses and validates a schema from a JSON document.
    pub fn from_value(doc: serde_json::Value) -> Result<Self, ProtocolError> {
        let doc: SchemaDoc = serde_json::from_value(doc)?;
        Self::from_doc(doc)
    }

    /// Parses and validates a schema from raw JSON text.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let doc: SchemaDoc = serde_json::from_str(text)?;
        Self::from_doc(doc)
    }

    fn from_doc(doc: SchemaDoc) -> Result<Self, ProtocolError> {
        let schema = Self {
            messages: doc.messages,
            services: doc.services,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Consistency checks run once at load time so that encode/decode can
    /// trust the shapes: unique tags per message, no dangling message
    /// references from fields or methods.
    fn validate(&self) -> Result<(), ProtocolError> {
        for (name, def) in &self.messages {
            let mut tags = HashSet::new();
            for field in &def.fields {
                if !tags.insert(field.tag) {
                    return Err(ProtocolError::InvalidSchema(format!(
                        "message `{name}` declares tag {} twice",
                        field.tag
                    )));
                }
                if field.kind == FieldKind::Message {
                    let target = field.message.as_deref().unwrap_or("");
                    if !self.messages.contains_key(target) {
                        return Err(ProtocolError::InvalidSchema(format!(
                            "field `{name}.{}` references unknown message `{target}`",
                            field.name
                        )));
                    }
                }
            }
        }
        for (service, def) in &self.services {
            for (method, m) in &def.methods {
                for shape in [&m.request, &m.response] {
                    if !self.messages.contains_key(shape) {
                        return Err(ProtocolError::InvalidSchema(format!(
                            "method `{service}.{method}` references unknown message `{shape}`"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Looks up a message shape by name.
    pub fn message(&self, name: &str) -> Result<&MessageDef, ProtocolError> {
        self.messages
            .get(name)
            .ok_or_else(|| ProtocolError::SchemaNotFound(name.to_string()))
    }

    /// Looks up a method by service and method name.
    pub fn method(
        &self,
        service: &str,
        method: &str,
    ) -> Result<&MethodDef, ProtocolError> {
        self.services
            .get(service)
            .and_then(|s| s.methods.get(method))
            .ok_or_else(|| {
                ProtocolError::SchemaNotFound(format!("{service}.{method}"))
            })
    }
}
