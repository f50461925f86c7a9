//! Client-level events: the merged error/liveness surface.

use majrpc_transport::ConnectionEvent;

/// Events broadcast to anyone watching the client's health.
///
/// This is the one stream external collaborators watch instead of wiring
/// up the connection's events and the heartbeat separately.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A connection lifecycle or transport event.
    Connection(ConnectionEvent),
    /// A heartbeat probe timed out or failed. The connection is still
    /// open; acting on this (e.g. rebuilding the client) is the
    /// caller's decision.
    HeartbeatFailed {
        /// Human-readable failure detail.
        detail: String,
    },
}
