//! Error types for the protocol layer.

/// Errors that can occur while loading a schema or transcoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A service, method, or message name is not present in the schema.
    ///
    /// Raised before any bytes are written, so a misaddressed call never
    /// reaches the wire.
    #[error("schema has no entry for `{0}`")]
    SchemaNotFound(String),

    /// Inbound bytes could not be decoded: truncated frame, unknown kind
    /// tag, unknown field tag, or invalid UTF-8 in a string field.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// An outbound value does not match the field shape the schema declares.
    #[error("cannot encode `{field}`: expected {expected}")]
    TypeMismatch {
        /// Dotted path of the offending field.
        field: String,
        /// The shape the schema declares for it.
        expected: &'static str,
    },

    /// The schema document itself failed to parse.
    #[error("invalid schema document: {0}")]
    SchemaParse(#[from] serde_json::Error),

    /// The schema document parsed but is internally inconsistent
    /// (duplicate field tags, dangling message references).
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}
