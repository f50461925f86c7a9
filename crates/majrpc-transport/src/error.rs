/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the WebSocket failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] tokio_tungstenite::tungstenite::Error),

    /// `init` was called on a connection that is already initialized.
    #[error("connection already initialized")]
    AlreadyConnected,

    /// The connection is not open. Writes after close (or before init)
    /// fail with this; mid-flight write failures are reported on the
    /// event stream instead.
    #[error("connection closed")]
    ConnectionClosed,
}
