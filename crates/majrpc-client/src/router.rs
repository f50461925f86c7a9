//! Fan-out of unsolicited server pushes.

use majrpc_protocol::{MessageCodec, WireKind, WireMessage};
use majrpc_transport::{Connection, ConnectionEvent};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Listeners that fall this far behind start dropping the oldest
/// notifications rather than stalling the router.
const ROUTER_CAPACITY: usize = 256;

/// A decoded server push.
#[derive(Debug, Clone)]
pub struct Notification {
    /// The schema message name the push arrived under.
    pub name: String,
    /// The decoded payload.
    pub data: Value,
}

/// Decodes notification frames and broadcasts them to every subscriber.
///
/// Each subscriber gets every notification independently; slow or dropped
/// subscribers never affect the others. Frames that fail to decode are
/// logged and skipped, so one malformed push cannot stall the stream.
/// When the connection closes the stream completes: pending and future
/// `recv` calls return `Closed`.
pub struct NotificationRouter {
    /// Handle to the channel. The only sender is owned by the route task,
    /// so the stream completes when that task exits on connection close.
    rx: broadcast::Receiver<Notification>,
    task: JoinHandle<()>,
}

impl NotificationRouter {
    /// Starts routing notifications from the given connection.
    pub fn new(connection: &Connection, codec: MessageCodec) -> Self {
        let (tx, rx) = broadcast::channel(ROUTER_CAPACITY);
        let task = tokio::spawn(route(
            connection.messages(),
            connection.events(),
            codec,
            tx,
        ));
        Self { rx, task }
    }

    /// Subscribes to all notifications from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.rx.resubscribe()
    }
}

impl Drop for NotificationRouter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn route(
    mut messages: broadcast::Receiver<WireMessage>,
    mut events: broadcast::Receiver<ConnectionEvent>,
    codec: MessageCodec,
    tx: broadcast::Sender<Notification>,
) {
    loop {
        tokio::select! {
            msg = messages.recv() => match msg {
                Ok(frame) if frame.kind == WireKind::Notification => {
                    let Some(name) = frame.name else {
                        tracing::warn!("notification frame without a name, skipping");
                        continue;
                    };
                    match codec.decode_notification(&name, &frame.payload) {
                        Ok(data) => {
                            tracing::debug!(%name, "notification routed");
                            let _ = tx.send(Notification { name, data });
                        }
                        Err(e) => {
                            tracing::warn!(%name, error = %e, "undecodable notification, skipping");
                        }
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "notification stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            ev = events.recv() => match ev {
                Ok(ConnectionEvent::Closed) => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    // Exiting drops the channel's only sender, completing every
    // subscriber's stream.
}
