use majrpc_client::RpcError;

/// Errors from room join/leave sequencing.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// A join, leave, or rejoin call failed.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// A rejoin after a leave failed, so membership in that room was
    /// lost even though references to it are still held.
    #[error("lost membership in room {room_id} after a leave elsewhere")]
    RejoinFailed {
        /// The room whose membership was dropped.
        room_id: u64,
        #[source]
        source: RpcError,
    },
}
