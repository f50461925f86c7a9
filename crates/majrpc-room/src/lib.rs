//! Reference-counted contest chat room subscriptions.
//!
//! The gateway has one sharp edge: leaving any chat room silently drops
//! membership in every room the session had joined. [`SubscriptionManager`]
//! compensates by counting references per room and, on the last release of
//! a room, rejoining every other room that is still held. Callers hold a
//! [`RoomSubscription`]; dropping it releases its reference exactly once.

mod error;
mod manager;

pub use error::RoomError;
pub use manager::{RoomSubscription, SubscriptionManager};
