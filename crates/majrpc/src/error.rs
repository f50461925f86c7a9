use majrpc_client::RpcError;
use majrpc_protocol::ProtocolError;
use majrpc_room::RoomError;
use majrpc_transport::TransportError;

/// Top-level error for the façade.
#[derive(Debug, thiserror::Error)]
pub enum MajrpcError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// The resource bundle listed no gateway servers.
    #[error("no gateway servers in the resource bundle")]
    EmptyServerList,

    /// The sign-in sequence completed without producing an account.
    #[error("login failed: {0}")]
    LoginFailed(String),
}
