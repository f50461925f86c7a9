//! RPC layer for majrpc.
//!
//! [`RpcClient`] multiplexes any number of in-flight calls over one
//! [`majrpc_transport::Connection`], correlating responses by id and
//! enforcing per-call deadlines. [`ServiceProxy`] binds a service name so
//! higher layers address methods without touching connection or codec
//! details; the [`Caller`] trait is the seam those layers (and their tests)
//! program against. [`NotificationRouter`] fans unsolicited server pushes
//! out to independent listeners, and [`HeartbeatMonitor`] probes liveness
//! without ever closing the connection.

mod client;
mod error;
mod event;
mod heartbeat;
mod proxy;
mod router;

pub use client::RpcClient;
pub use error::RpcError;
pub use event::ClientEvent;
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use proxy::{Caller, ServiceProxy, DEFAULT_CALL_TIMEOUT};
pub use router::{Notification, NotificationRouter};
