//! The persistent WebSocket connection.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use majrpc_protocol::WireMessage;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;

use crate::TransportError;

/// Inbound frame fan-out capacity. A slow subscriber lags rather than
/// blocking the reader.
const MESSAGE_CHANNEL_SIZE: usize = 256;
const EVENT_CHANNEL_SIZE: usize = 32;

/// Lifecycle of a connection. One-way: there is no reconnect; a closed
/// connection stays closed and callers build a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created but `init` has not completed.
    Connecting,
    /// The socket is open and both pump tasks are running.
    Open,
    /// Terminal.
    Closed,
}

const STATE_CONNECTING: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle and error events, broadcast to all subscribers.
///
/// `Closed` is terminal: subscribers should treat it as end-of-stream.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The socket finished opening.
    Opened,
    /// A non-fatal transport or framing problem. The offending frame was
    /// dropped; the connection is still open.
    Error(String),
    /// The connection transitioned to `Closed`.
    Closed,
}

enum Outbound {
    Frame(Vec<u8>),
    Shutdown,
}

/// A single long-lived duplex connection to the game gateway.
///
/// Created with [`Connection::new`], opened with [`Connection::init`].
/// Cheap handles are not provided; share the connection behind an `Arc`.
pub struct Connection {
    url: String,
    state: Arc<AtomicU8>,
    messages_tx: broadcast::Sender<WireMessage>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    /// Taken by `init`; `Some` only before the first successful init.
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
}

impl Connection {
    /// Creates a connection targeting `url`. No I/O happens until `init`.
    ///
    /// Subscribing to [`Connection::messages`] or [`Connection::events`]
    /// before `init` is allowed and loses nothing.
    pub fn new(url: impl Into<String>) -> Self {
        let (messages_tx, _) = broadcast::channel(MESSAGE_CHANNEL_SIZE);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            state: Arc::new(AtomicU8::new(STATE_CONNECTING)),
            messages_tx,
            events_tx,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        }
    }

    /// Opens the socket and starts the reader and writer tasks.
    ///
    /// Resolves once the transport reports open. Calling `init` twice
    /// fails with [`TransportError::AlreadyConnected`].
    pub async fn init(&self) -> Result<(), TransportError> {
        let outbound_rx = self
            .outbound_rx
            .lock()
            .await
            .take()
            .ok_or(TransportError::AlreadyConnected)?;

        let (ws, _) = tokio_tungstenite::connect_async(&self.url)
            .await
            .map_err(TransportError::ConnectFailed)?;
        let (sink, stream) = ws.split();

        self.state.store(STATE_OPEN, Ordering::SeqCst);
        tracing::info!(url = %self.url, "connection open");
        let _ = self.events_tx.send(ConnectionEvent::Opened);

        tokio::spawn(write_pump(
            sink,
            outbound_rx,
            Arc::clone(&self.state),
            self.events_tx.clone(),
        ));
        tokio::spawn(read_pump(
            stream,
            Arc::clone(&self.state),
            self.messages_tx.clone(),
            self.events_tx.clone(),
            self.outbound_tx.clone(),
        ));
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_OPEN => ConnectionState::Open,
            STATE_CLOSED => ConnectionState::Closed,
            _ => ConnectionState::Connecting,
        }
    }

    /// Subscribes to inbound frame envelopes, in wire arrival order.
    /// Every subscriber sees every frame.
    pub fn messages(&self) -> broadcast::Receiver<WireMessage> {
        self.messages_tx.subscribe()
    }

    /// Subscribes to lifecycle and error events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events_tx.subscribe()
    }

    /// Queues a frame for writing. Fire-and-forget: delivery failures are
    /// reported on the event stream, not to this caller.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Open {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound_tx
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Closes the connection. Idempotent; a second call is a no-op.
    pub fn close(&self) {
        if mark_closed(&self.state, &self.events_tx) {
            let _ = self.outbound_tx.send(Outbound::Shutdown);
            tracing::info!(url = %self.url, "connection closed");
        }
    }
}

/// Flips the state to `Closed` and emits the terminal event exactly once.
/// Returns whether this call did the transition.
fn mark_closed(
    state: &AtomicU8,
    events_tx: &broadcast::Sender<ConnectionEvent>,
) -> bool {
    if state.swap(STATE_CLOSED, Ordering::SeqCst) != STATE_CLOSED {
        let _ = events_tx.send(ConnectionEvent::Closed);
        true
    } else {
        false
    }
}

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    Message,
>;
type WsStream = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
>;

/// Drains the outbound queue into the socket until shutdown or write failure.
async fn write_pump(
    mut sink: WsSink,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    state: Arc<AtomicU8>,
    events_tx: broadcast::Sender<ConnectionEvent>,
) {
    while let Some(item) = outbound_rx.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if let Err(e) = sink.send(Message::Binary(frame.into())).await {
                    tracing::debug!(error = %e, "write failed");
                    let _ = events_tx
                        .send(ConnectionEvent::Error(format!("write failed: {e}")));
                    mark_closed(&state, &events_tx);
                    return;
                }
            }
            Outbound::Shutdown => {
                let _ = sink.close().await;
                return;
            }
        }
    }
}

/// Pumps inbound socket messages into the frame broadcast until the peer
/// closes or the socket errors. Individual undecodable frames are dropped
/// with an error event; they do not end the connection.
async fn read_pump(
    mut stream: WsStream,
    state: Arc<AtomicU8>,
    messages_tx: broadcast::Sender<WireMessage>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
) {
    while let Some(msg) = stream.next().await {
        let data: Vec<u8> = match msg {
            Ok(Message::Binary(data)) => data.into(),
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue, // ping/pong/raw frame
            Err(e) => {
                tracing::debug!(error = %e, "socket error");
                let _ = events_tx
                    .send(ConnectionEvent::Error(format!("socket error: {e}")));
                break;
            }
        };
        match WireMessage::decode(&data) {
            Ok(frame) => {
                let _ = messages_tx.send(frame);
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable frame");
                let _ = events_tx.send(ConnectionEvent::Error(e.to_string()));
            }
        }
    }
    if mark_closed(&state, &events_tx) {
        tracing::info!("connection closed by peer");
    }
    let _ = outbound_tx.send(Outbound::Shutdown);
}
