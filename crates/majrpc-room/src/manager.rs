//! Room refcounting and the join/leave/rejoin sequence.

use std::collections::HashMap;
use std::sync::Arc;

use majrpc_client::{Caller, Notification};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};

use crate::RoomError;

const JOIN_METHOD: &str = "joinCustomizedContestChatRoom";
const LEAVE_METHOD: &str = "leaveCustomizedContestChatRoom";

struct Shared<C> {
    caller: C,
    /// Room id → live reference count. Entries exist only while the count
    /// is at least one. The lock is held across the whole join or
    /// leave/rejoin sequence so concurrent acquires and releases never
    /// interleave their gateway calls.
    rooms: Mutex<HashMap<u64, usize>>,
}

impl<C: Caller> Shared<C> {
    async fn release(&self, room_id: u64) -> Result<(), RoomError> {
        let mut rooms = self.rooms.lock().await;
        let Some(count) = rooms.get_mut(&room_id) else {
            tracing::warn!(room_id, "release of a room that is not held");
            return Ok(());
        };
        *count -= 1;
        if *count > 0 {
            tracing::debug!(room_id, refs = *count, "room reference released");
            return Ok(());
        }
        rooms.remove(&room_id);

        // Leaving drops membership in every room, so rejoin the rest.
        self.caller.call(LEAVE_METHOD, json!({})).await?;
        tracing::info!(room_id, "left room");

        let mut others: Vec<u64> = rooms.keys().copied().collect();
        others.sort_unstable();
        for other in others {
            self.caller
                .call(JOIN_METHOD, json!({ "unique_id": other }))
                .await
                .map_err(|source| RoomError::RejoinFailed {
                    room_id: other,
                    source,
                })?;
            tracing::info!(room_id = other, "rejoined room after leave");
        }
        Ok(())
    }
}

/// Tracks how many live subscriptions each room has and only talks to the
/// gateway on the first acquire and the last release of a room.
pub struct SubscriptionManager<C> {
    shared: Arc<Shared<C>>,
}

impl<C> Clone for SubscriptionManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Caller + 'static> SubscriptionManager<C> {
    /// Creates a manager issuing room calls through `caller`.
    pub fn new(caller: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                caller,
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Takes a reference on `room_id`, joining it on the gateway if this
    /// is the first. `notifications` is the stream the returned handle
    /// filters for this room's messages.
    pub async fn acquire(
        &self,
        room_id: u64,
        notifications: broadcast::Receiver<Notification>,
    ) -> Result<RoomSubscription<C>, RoomError> {
        let mut rooms = self.shared.rooms.lock().await;
        match rooms.get_mut(&room_id) {
            Some(count) => {
                *count += 1;
                tracing::debug!(room_id, refs = *count, "room reference added");
            }
            None => {
                self.shared
                    .caller
                    .call(JOIN_METHOD, json!({ "unique_id": room_id }))
                    .await?;
                rooms.insert(room_id, 1);
                tracing::info!(room_id, "joined room");
            }
        }
        drop(rooms);

        Ok(RoomSubscription {
            room_id,
            notifications,
            shared: Some(Arc::clone(&self.shared)),
        })
    }

    /// How many rooms currently have at least one live subscription.
    pub async fn active_rooms(&self) -> usize {
        self.shared.rooms.lock().await.len()
    }
}

/// A live reference to one room.
///
/// [`recv`](Self::recv) yields only this room's notifications. Dropping
/// the handle releases its reference in the background; call
/// [`release`](Self::release) instead to observe the outcome.
pub struct RoomSubscription<C: Caller + 'static> {
    room_id: u64,
    notifications: broadcast::Receiver<Notification>,
    shared: Option<Arc<Shared<C>>>,
}

impl<C: Caller + 'static> RoomSubscription<C> {
    /// The room this handle is subscribed to.
    pub fn room_id(&self) -> u64 {
        self.room_id
    }

    /// Waits for the next notification addressed to this room, skipping
    /// everything else. Returns `None` once the source stream is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.notifications.recv().await {
                Ok(n) => {
                    let addressed = n.data.get("unique_id").and_then(Value::as_u64)
                        == Some(self.room_id);
                    if addressed {
                        return Some(n);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(
                        room_id = self.room_id,
                        missed,
                        "room notification stream lagged"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Releases this reference and reports how the leave/rejoin went.
    pub async fn release(mut self) -> Result<(), RoomError> {
        match self.shared.take() {
            Some(shared) => shared.release(self.room_id).await,
            None => Ok(()),
        }
    }
}

impl<C: Caller + 'static> Drop for RoomSubscription<C> {
    fn drop(&mut self) {
        let Some(shared) = self.shared.take() else { return };
        let room_id = self.room_id;
        tokio::spawn(async move {
            if let Err(e) = shared.release(room_id).await {
                tracing::warn!(room_id, error = %e, "background room release failed");
            }
        });
    }
}
