//! Persistent schema-driven RPC client for the Mahjong Soul game service.
//!
//! [`Api`] is the façade: hand it an [`ApiResources`] bundle (game version,
//! gateway server list, protocol schema document), `init()` it, and call
//! the typed lobby operations. Under the hood one long-lived WebSocket
//! carries every call, server push, and heartbeat; the lower crates
//! (`majrpc-transport`, `majrpc-protocol`, `majrpc-client`, `majrpc-room`)
//! are re-exported for callers that need the seams directly.

mod api;
mod error;
mod login;
mod pagination;
mod records;
mod zone;

pub use api::{Api, ApiResources};
pub use error::MajrpcError;
pub use records::{Account, Contest, GameRecord, GameStep, Player};
pub use zone::{player_zone, PlayerZone};

pub use majrpc_client::{ClientEvent, Notification, RpcError};
pub use majrpc_room::{RoomError, RoomSubscription};
