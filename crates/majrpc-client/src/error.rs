//! Error types for the RPC layer.

use std::time::Duration;

use majrpc_protocol::ProtocolError;
use majrpc_transport::TransportError;

/// Errors that can fail an individual call.
///
/// Per-call failures stay local to the caller that issued the call; only
/// connection-level and heartbeat failures are broadcast (see
/// [`crate::ClientEvent`]).
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The local deadline passed with no response. The request is not
    /// retracted on the wire; a late response is ignored.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with an explicit error payload.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Server-reported error code.
        code: u64,
        /// Server-reported detail, empty when none was given.
        message: String,
    },

    /// The connection closed while the call was pending, or the call was
    /// issued after close.
    #[error("connection closed")]
    ConnectionClosed,

    /// Encoding the request or decoding the response failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport refused the write.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
