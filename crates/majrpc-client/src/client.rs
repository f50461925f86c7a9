//! The RPC client: request/response correlation over one connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use majrpc_protocol::{MessageCodec, WireKind, WireMessage};
use majrpc_transport::{Connection, ConnectionEvent};
use serde_json::Value;
use tokio::sync::{broadcast, oneshot, Mutex};

use crate::RpcError;

/// One outstanding call. Removed from the pending map exactly once: by a
/// matching response, by its deadline, or by connection closure.
struct PendingCall {
    service: String,
    method: String,
    issued_at: Instant,
    resolve: oneshot::Sender<Result<Value, RpcError>>,
}

type PendingMap = Arc<Mutex<HashMap<u32, PendingCall>>>;

/// Issues uniquely-identified requests and routes responses back to the
/// callers that issued them.
///
/// Any number of calls may be in flight concurrently; responses may arrive
/// in any order and are matched by correlation id, never by order. All
/// mutable state (the pending map, the id counter) is owned by this
/// instance — multiple clients in one process never interfere.
pub struct RpcClient {
    connection: Arc<Connection>,
    codec: MessageCodec,
    /// Next correlation id. Monotonic for the connection's lifetime;
    /// never reused.
    next_id: AtomicU32,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
}

impl RpcClient {
    /// Creates a client over a connection and starts its dispatch task.
    ///
    /// The dispatch task is the single writer for response-side resolution:
    /// it matches response frames against the pending map and fails every
    /// outstanding call in one pass when the connection closes.
    pub fn new(connection: Arc<Connection>, codec: MessageCodec) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(dispatch(
            connection.messages(),
            connection.events(),
            Arc::clone(&pending),
            Arc::clone(&closed),
            codec.clone(),
        ));

        Self {
            connection,
            codec,
            next_id: AtomicU32::new(1),
            pending,
            closed,
        }
    }

    /// Whether the underlying connection has closed. Calls issued after
    /// this returns true fail immediately.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Issues `Service.method` with `args` and waits for the response,
    /// the deadline, or connection closure — whichever comes first.
    ///
    /// Timing out abandons the call locally only; nothing is retracted on
    /// the wire, and a response arriving after the deadline is dropped by
    /// the dispatch task as unmatched.
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        args: Value,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        if self.is_closed() {
            return Err(RpcError::ConnectionClosed);
        }
        // Resolve the method before allocating an id so a misaddressed
        // call consumes nothing.
        self.codec.schema().method(service, method)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = self.codec.encode_request(id, service, method, &args)?;

        let (resolve, mut response) = oneshot::channel();
        self.pending.lock().await.insert(
            id,
            PendingCall {
                service: service.to_string(),
                method: method.to_string(),
                issued_at: Instant::now(),
                resolve,
            },
        );
        tracing::debug!(id, service, method, "call issued");

        if let Err(e) = self.connection.send(frame) {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        tokio::select! {
            res = &mut response => match res {
                Ok(outcome) => outcome,
                // Resolver dropped without sending: closure raced us.
                Err(_) => Err(RpcError::ConnectionClosed),
            },
            _ = tokio::time::sleep(timeout) => {
                // The pending map decides the race: whoever removes the
                // entry owns the outcome.
                if self.pending.lock().await.remove(&id).is_some() {
                    tracing::debug!(id, service, method, "call timed out");
                    Err(RpcError::Timeout(timeout))
                } else {
                    match response.await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(RpcError::ConnectionClosed),
                    }
                }
            }
        }
    }
}

/// Routes response frames to pending calls until the connection goes away.
async fn dispatch(
    mut messages: broadcast::Receiver<WireMessage>,
    mut events: broadcast::Receiver<ConnectionEvent>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    codec: MessageCodec,
) {
    loop {
        tokio::select! {
            msg = messages.recv() => match msg {
                Ok(frame) if frame.kind == WireKind::Response => {
                    resolve_response(frame, &pending, &codec).await;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "response stream lagged");
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
    fail_all_pending(&pending, &closed).await;
}

/// Matches a response frame against the pending map and resolves the
/// caller exactly once. Unmatched ids (late responses after a timeout,
/// or a duplicate response — a protocol violation) are logged and ignored.
async fn resolve_response(
    frame: WireMessage,
    pending: &PendingMap,
    codec: &MessageCodec,
) {
    let Some(id) = frame.id else { return };
    let Some(call) = pending.lock().await.remove(&id) else {
        tracing::warn!(id, "response with no matching pending call, ignoring");
        return;
    };

    let outcome = codec
        .decode_response(&call.service, &call.method, &frame.payload)
        .map_err(RpcError::from)
        .and_then(|value| match remote_error(&value) {
            Some((code, message)) => Err(RpcError::Remote { code, message }),
            None => Ok(value),
        });

    tracing::debug!(
        id,
        service = %call.service,
        method = %call.method,
        elapsed = ?call.issued_at.elapsed(),
        ok = outcome.is_ok(),
        "call resolved"
    );
    // The caller may have timed out and gone away; that's fine.
    let _ = call.resolve.send(outcome);
}

/// Bulk-rejects every outstanding call. Runs once per connection; the
/// `closed` flag also makes later `call`s fail fast.
async fn fail_all_pending(pending: &PendingMap, closed: &AtomicBool) {
    closed.store(true, Ordering::SeqCst);
    let drained: Vec<PendingCall> =
        pending.lock().await.drain().map(|(_, call)| call).collect();
    if !drained.is_empty() {
        tracing::info!(count = drained.len(), "failing pending calls on close");
    }
    for call in drained {
        let _ = call.resolve.send(Err(RpcError::ConnectionClosed));
    }
}

/// A response payload carrying `error.code != 0` is a server-reported
/// failure, not a transport problem.
fn remote_error(value: &Value) -> Option<(u64, String)> {
    let err = value.get("error")?;
    let code = err.get("code")?.as_u64()?;
    if code == 0 {
        return None;
    }
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((code, message))
}
