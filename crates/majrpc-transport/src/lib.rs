//! Transport layer for majrpc: one long-lived WebSocket per client.
//!
//! [`Connection`] owns the socket and exposes three things to the layers
//! above: a fan-out stream of decoded inbound frame envelopes, a fan-out
//! stream of lifecycle/error events, and a fire-and-forget [`Connection::send`].
//! Payload decoding happens above this crate; the connection only splits
//! frame envelopes.

mod connection;
mod error;

pub use connection::{Connection, ConnectionEvent, ConnectionState};
pub use error::TransportError;
