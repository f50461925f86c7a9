//! Wire protocol for majrpc.
//!
//! This crate defines everything needed to turn lobby calls into bytes and
//! bytes back into structured values:
//!
//! - **Schema** ([`ProtocolSchema`]) — the externally supplied definition of
//!   message and service shapes, loaded once at startup.
//! - **Framing** ([`WireMessage`], [`WireKind`]) — the envelope that tags
//!   every frame as a request, response, or notification.
//! - **Codec** ([`MessageCodec`]) — schema-driven encoding and decoding of
//!   payloads, addressed by service/method or message name.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during either step.
//!
//! The protocol layer knows nothing about connections, correlation ids, or
//! pending calls. It is a pure transform and is safe to share across tasks.

mod codec;
mod error;
mod frame;
mod schema;
mod wire;

pub use codec::{bytes_to_value, value_to_bytes, MessageCodec};
pub use error::ProtocolError;
pub use frame::{WireKind, WireMessage};
pub use schema::{
    FieldDef, FieldKind, MessageDef, MethodDef, ProtocolSchema, ServiceDef,
};
